//! FHIR R4 search syntax reference embedded in the query-synthesis prompt.

pub(crate) const SYNTAX_REFERENCE: &str = r#"# FHIR search syntax reference

## Combining parameters
AND: repeat a parameter or use different parameters, joined with "&".
  given=John&family=Smith          given name John AND family name Smith
  date=ge2020-01-01&date=lt2021-01-01
OR: comma-separated values within one parameter.
  given=John,Jane                  given name John OR Jane

## Chaining
Search on a property of a referenced resource with "." in the parameter name.
  patient.name=Smith               (on Observation) the patient's name is Smith
  patient.identifier=http://hospital.org/mrn|12345
  subject:Patient.name=Smith       restrict the reference to one target type first
  result.subject.name=Smith        (on DiagnosticReport) several levels deep
Reverse chaining uses _has:[Resource]:[reference param]:[param]=[value].

## Prefixes (number, date, quantity)
eq equal (default), ne not equal, gt greater than, lt less than,
ge greater or equal, le less or equal, sa starts after, eb ends before,
ap approximately (about 10%). The prefix goes directly before the value:
birthdate=gt1990-12-31, value-quantity=le5.4.

## Modifiers
:missing    any single-element type; value true or false
:exact      string; case-sensitive whole-value match
:contains   string, uri; match anywhere in the value
:text       token, reference; match the display text
:not        token; negation
:above      token, reference, uri; ancestors / broader
:below      token, reference, uri; descendants / narrower
:in         token; code is in the given ValueSet
:not-in     token; code is not in the given ValueSet
:identifier reference; match Reference.identifier
:of-type    token; identifier by type code and value (type-system|type-code|value)
:[type]     reference; restrict the reference to a resource type, e.g. subject:Patient=23

## Value grammar by parameter type
number     [prefix][number], precision matters (100 vs 100.00), exponents allowed (1e2).
           count=ge100
date       [prefix]yyyy-mm-ddThh:mm:ss.ssss[Z|(+|-)hh:mm], any prefix precision
           (yyyy, yyyy-mm, yyyy-mm-dd). A date matches against the whole period it covers.
           birthdate=ge2013-03-14, date=lt2013-01-14T10:00
string     case- and accent-insensitive; matches values that equal or start with the input.
           given=eve matches Eve and Evelyn; given:contains=eve also matches Severine;
           given:exact=Eve matches only Eve.
token      [code], [system]|[code], |[code] (no system) or [system]| (any code in system).
           gender=male, identifier=http://acme.org/patient|2345,
           code:below=http://snomed.info/sct|235862008
reference  [id], [type]/[id] or an absolute URL.
           subject=Patient/23, subject:Patient=23, subject:identifier=http://example.org/mrn|12345
quantity   [prefix][number]|[system]|[code]; system may be empty.
           value-quantity=5.4|http://unitsofmeasure.org|mg, value-quantity=le5.4||mg
uri        exact, case-sensitive whole-URI match; :above / :below for partial matches.
           url=http://acme.org/fhir/ValueSet/123, url:below=http://acme.org/fhir
composite  component values joined with "$".
           code-value-quantity=http://loinc.org|2823-3$gt5.4|http://unitsofmeasure.org|mmol/L
special    behavior is defined by the parameter itself (see its description); the general
           prefixes and modifiers only apply where the description says so.
"#;
