use clap::{Parser, Subcommand};

use fhir_query_builder::Config;

#[derive(Parser)]
#[command(name = "fhir-query")]
#[command(about = "Build FHIR search queries from natural language")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// FHIR server base URL
    #[arg(short, long, global = true, env = "FHIR_SERVER_URL")]
    pub server: Option<String>,

    /// Basic-auth username for the FHIR server
    #[arg(short, long, global = true, env = "FHIR_USERNAME")]
    pub username: Option<String>,

    /// Basic-auth password for the FHIR server
    #[arg(long, global = true, env = "FHIR_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Claude model used by both agents
    #[arg(short, long, global = true, env = "ANTHROPIC_MODEL")]
    pub model: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the server's searchable resource types
    Types,
    /// Show the search parameters a resource type advertises
    Params {
        /// Resource type, e.g. Patient
        resource_type: String,
    },
    /// Suggest resource types for a request
    Select {
        /// Natural-language request
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Build a search URL for a request
    Build {
        /// Skip type selection and build for this resource type
        #[arg(short = 't', long = "type")]
        resource_type: Option<String>,
        /// Natural-language request
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
}

impl Cli {
    /// Flags take precedence over the environment-derived config.
    pub fn apply(&self, config: &mut Config) {
        if let Some(server) = &self.server {
            config.fhir_server_url = server.trim_end_matches('/').to_string();
        }
        if let Some(username) = &self.username {
            config.fhir_username = Some(username.clone());
        }
        if let Some(password) = &self.password {
            config.fhir_password = Some(password.clone());
        }
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
    }
}
