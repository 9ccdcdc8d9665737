//! fhir-query: command-line front end for the query builder.

mod cli;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Commands};
use fhir_query_builder::{
    Config, FhirMetadata, QuerySynthesis, QuerySynthesizer, SelectTypesAgent, TypeSelection,
    common_search_params, get_search_parameters,
};

/// Exit status when an agent reports it could not satisfy the request
const EXIT_UNSATISFIED: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr so stdout carries only results.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if std::env::var("LOG_FORMAT").is_ok_and(|f| f == "json") {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let mut config = Config::from_env();
    cli.apply(&mut config);

    let metadata = config
        .metadata_client()?
        .fetch_searchable_resources(&config.fhir_server_url, config.credentials().as_ref())
        .await
        .with_context(|| format!("Could not load metadata from {}", config.fhir_server_url))?;
    let metadata = Arc::new(metadata);

    match &cli.command {
        Commands::Types => {
            if cli.json {
                print_json(&metadata.sorted_types())?;
            } else {
                for resource_type in metadata.sorted_types() {
                    println!("{resource_type}");
                }
            }
        }
        Commands::Params { resource_type } => {
            let params = get_search_parameters(resource_type, &metadata)?;
            if cli.json {
                print_json(&params)?;
            } else {
                for param in params {
                    println!("{param}");
                }
            }
        }
        Commands::Select { text } => {
            let selection = select(&config, &metadata, &text.join(" ")).await?;
            print_selection(&selection, cli.json)?;
            return Ok(ExitCode::from(selection_status(&selection)));
        }
        Commands::Build {
            resource_type,
            text,
        } => {
            let text = text.join(" ");
            let target = match resource_type {
                Some(resource_type) => resource_type.clone(),
                None => {
                    let selection = select(&config, &metadata, &text).await?;
                    match &selection {
                        TypeSelection::Candidates(candidates) => {
                            let top = candidates
                                .first()
                                .context("type selection returned no candidates")?;
                            eprintln!(
                                "Using {} (confidence {:.2}): {}",
                                top.selected_type, top.confidence, top.reasoning
                            );
                            top.selected_type.clone()
                        }
                        TypeSelection::Error(_) => {
                            print_selection(&selection, cli.json)?;
                            return Ok(ExitCode::from(selection_status(&selection)));
                        }
                    }
                }
            };

            let synthesizer = QuerySynthesizer::new(
                config.claude_client()?,
                &target,
                &metadata,
                &common_search_params(),
            )?;

            let synthesis = synthesizer.synthesize(&text).await?;
            match &synthesis {
                QuerySynthesis::Query(output) => {
                    let url = synthesizer.search_url(output);
                    if cli.json {
                        print_json(&serde_json::json!({
                            "resource_type": synthesizer.target_type(),
                            "query_string": output.query_string(),
                            "url": url,
                        }))?;
                    } else {
                        println!("{url}");
                    }
                }
                QuerySynthesis::Error(err) => {
                    if cli.json {
                        print_json(&synthesis)?;
                    } else {
                        println!("Could not build query: {}", err.error);
                        if let Some(suggestion) = &err.suggestion {
                            println!("Suggestion: {suggestion}");
                        }
                    }
                }
            }
            return Ok(ExitCode::from(synthesis_status(&synthesis)));
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn selection_status(selection: &TypeSelection) -> u8 {
    match selection {
        TypeSelection::Candidates(_) => 0,
        TypeSelection::Error(_) => EXIT_UNSATISFIED,
    }
}

fn synthesis_status(synthesis: &QuerySynthesis) -> u8 {
    match synthesis {
        QuerySynthesis::Query(_) => 0,
        QuerySynthesis::Error(_) => EXIT_UNSATISFIED,
    }
}

async fn select(config: &Config, metadata: &Arc<FhirMetadata>, text: &str) -> Result<TypeSelection> {
    let agent = SelectTypesAgent::new(config.claude_client()?, Arc::clone(metadata));
    Ok(agent.select_types(text).await?)
}

fn print_selection(selection: &TypeSelection, json: bool) -> Result<()> {
    if json {
        return print_json(selection);
    }

    match selection {
        TypeSelection::Candidates(candidates) => {
            for (idx, candidate) in candidates.iter().enumerate() {
                println!(
                    "{}. {} ({:.0}%): {}",
                    idx + 1,
                    candidate.selected_type,
                    candidate.confidence * 100.0,
                    candidate.reasoning
                );
            }
        }
        TypeSelection::Error(err) => {
            println!("No matching resource type: {}", err.error);
            println!("Reason: {}", err.reasoning);
        }
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
