//! Catalog of Snowflake external functions fronting the Autopilot REST API
//!
//! Each entry binds a Snowflake symbol to a path under the API Gateway base
//! URL. The serializer and deserializer bodies are JavaScript owned by the
//! gateway contract; they live next to this file and are shipped verbatim,
//! except for the `{{...}}` placeholders filled from [`TemplateValues`].

use std::str::FromStr;

const CONTEXT_HEADERS: &str = "context_headers = (CURRENT_DATABASE, CURRENT_SCHEMA, CURRENT_WAREHOUSE)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExternalFunction {
    pub name: &'static str,
    /// Parenthesised argument lists; one external function per overload.
    pub signatures: &'static [&'static str],
    pub url_suffix: &'static str,
    pub serializer: &'static str,
    pub deserializer: &'static str,
    pub context_headers: bool,
}

/// Which external functions a deployment registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FunctionCatalog {
    #[default]
    Autopilot,
    /// Integrations only.
    Empty,
}

impl FunctionCatalog {
    pub fn functions(&self) -> &'static [ExternalFunction] {
        match self {
            Self::Autopilot => AUTOPILOT_FUNCTIONS,
            Self::Empty => &[],
        }
    }
}

impl FromStr for FunctionCatalog {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "autopilot" => Ok(Self::Autopilot),
            "none" | "empty" => Ok(Self::Empty),
            other => Err(format!("expected `autopilot` or `none`, got `{other}`")),
        }
    }
}

const PASSTHROUGH_DESERIALIZER: &str = include_str!("functions/passthrough_deserializer.js");
const ENDPOINT_NAME_SERIALIZER: &str = include_str!("functions/endpoint_name_serializer.js");
const ENDPOINT_CONFIG_NAME_SERIALIZER: &str =
    include_str!("functions/endpoint_config_name_serializer.js");

/// The endpoint-config lookups keep the four-argument signature the gateway
/// has always been called with, even though only the first argument is read.
const ENDPOINT_CONFIG_SIGNATURE: &str =
    "(endpointConfigName varchar, modelName varchar, instanceType varchar, instanceCount int)";

pub static AUTOPILOT_FUNCTIONS: &[ExternalFunction] = &[
    ExternalFunction {
        name: "AWS_AUTOPILOT_DESCRIBE_MODEL",
        signatures: &["(modelname varchar)"],
        url_suffix: "describemodel",
        serializer: include_str!("functions/describe_model_serializer.js"),
        deserializer: include_str!("functions/describe_model_deserializer.js"),
        context_headers: false,
    },
    ExternalFunction {
        name: "AWS_AUTOPILOT_CREATE_ENDPOINT",
        signatures: &["(endpointName varchar, endpointConfigName varchar)"],
        url_suffix: "createendpoint",
        serializer: include_str!("functions/create_endpoint_serializer.js"),
        deserializer: PASSTHROUGH_DESERIALIZER,
        context_headers: false,
    },
    ExternalFunction {
        name: "AWS_AUTOPILOT_CREATE_ENDPOINT_CONFIG",
        signatures: &[ENDPOINT_CONFIG_SIGNATURE],
        url_suffix: "createendpointconfig",
        serializer: include_str!("functions/create_endpoint_config_serializer.js"),
        deserializer: PASSTHROUGH_DESERIALIZER,
        context_headers: false,
    },
    ExternalFunction {
        name: "AWS_AUTOPILOT_DESCRIBE_ENDPOINT",
        signatures: &["(endpointName varchar)"],
        url_suffix: "describeendpoint",
        serializer: ENDPOINT_NAME_SERIALIZER,
        deserializer: PASSTHROUGH_DESERIALIZER,
        context_headers: false,
    },
    ExternalFunction {
        name: "AWS_AUTOPILOT_DELETE_ENDPOINT",
        signatures: &["(endpointName varchar)"],
        url_suffix: "deleteendpoint",
        serializer: ENDPOINT_NAME_SERIALIZER,
        deserializer: PASSTHROUGH_DESERIALIZER,
        context_headers: false,
    },
    ExternalFunction {
        name: "AWS_AUTOPILOT_PREDICT_OUTCOME",
        signatures: &["(endpointName varchar, columns array)"],
        url_suffix: "predictoutcome",
        serializer: include_str!("functions/predict_outcome_serializer.js"),
        deserializer: include_str!("functions/predict_outcome_deserializer.js"),
        context_headers: false,
    },
    ExternalFunction {
        name: "AWS_AUTOPILOT_CREATE_MODEL",
        signatures: &[
            "(modelname varchar, targettable varchar, targetcol varchar)",
            "(modelname varchar, targettable varchar, targetcol varchar, objective_metric varchar, problem_type varchar, max_running_time integer, deploy_model boolean, model_endpoint_ttl integer)",
        ],
        url_suffix: "createmodel",
        serializer: include_str!("functions/create_model_serializer.js"),
        deserializer: include_str!("functions/create_model_deserializer.js"),
        context_headers: true,
    },
    ExternalFunction {
        name: "AWS_AUTOPILOT_DELETE_ENDPOINT_CONFIG",
        signatures: &[ENDPOINT_CONFIG_SIGNATURE],
        url_suffix: "deleteendpointconfig",
        serializer: ENDPOINT_CONFIG_NAME_SERIALIZER,
        deserializer: PASSTHROUGH_DESERIALIZER,
        context_headers: false,
    },
    ExternalFunction {
        name: "AWS_AUTOPILOT_DESCRIBE_ENDPOINT_CONFIG",
        signatures: &[ENDPOINT_CONFIG_SIGNATURE],
        url_suffix: "describeendpointconfig",
        serializer: ENDPOINT_CONFIG_NAME_SERIALIZER,
        deserializer: PASSTHROUGH_DESERIALIZER,
        context_headers: false,
    },
];

/// Deployment values substituted into the function bodies.
#[derive(Debug, Clone, Default)]
pub struct TemplateValues<'a> {
    pub output_bucket: &'a str,
    pub kms_key_arn: &'a str,
    pub snowflake_role: &'a str,
    pub secret_arn: &'a str,
    pub storage_integration: &'a str,
    pub role_arn: &'a str,
}

impl TemplateValues<'_> {
    /// Fill the placeholders of a JavaScript body. Values land inside
    /// double-quoted JS string literals and are escaped for that.
    pub fn render(&self, body: &str) -> String {
        [
            ("{{OUTPUT_BUCKET}}", self.output_bucket),
            ("{{KMS_KEY_ARN}}", self.kms_key_arn),
            ("{{SNOWFLAKE_ROLE}}", self.snowflake_role),
            ("{{SECRET_ARN}}", self.secret_arn),
            ("{{STORAGE_INTEGRATION}}", self.storage_integration),
            ("{{ROLE_ARN}}", self.role_arn),
        ]
        .into_iter()
        .fold(body.to_string(), |text, (placeholder, value)| {
            text.replace(placeholder, &escape_js(value))
        })
    }
}

fn escape_js(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

impl ExternalFunction {
    pub fn serializer_name(&self) -> String {
        format!("{}_SERIALIZER", self.name)
    }

    pub fn deserializer_name(&self) -> String {
        format!("{}_DESERIALIZER", self.name)
    }

    /// Statements registering this function, in execution order: serializer,
    /// deserializer, then one external function per signature.
    pub fn statements(
        &self,
        api_integration: &str,
        gateway_url: &str,
        values: &TemplateValues<'_>,
    ) -> Vec<String> {
        let mut statements = vec![
            js_function(&self.serializer_name(), &values.render(self.serializer)),
            js_function(&self.deserializer_name(), &values.render(self.deserializer)),
        ];

        statements.extend(self.signatures.iter().map(|signature| {
            let headers = if self.context_headers {
                format!("{CONTEXT_HEADERS}\n")
            } else {
                String::new()
            };

            format!(
                "create or replace external function {name}{signature}\n\
                 returns variant\n\
                 api_integration = \"{api_integration}\"\n\
                 {headers}\
                 serializer = {serializer}\n\
                 deserializer = {deserializer}\n\
                 max_batch_rows = 1\n\
                 as '{base}/{suffix}'",
                name = self.name,
                base = gateway_url.trim_end_matches('/'),
                serializer = self.serializer_name(),
                deserializer = self.deserializer_name(),
                suffix = self.url_suffix,
            )
        }));

        statements
    }
}

fn js_function(name: &str, body: &str) -> String {
    format!(
        "create or replace function {name}(EVENT OBJECT)\n\
         returns OBJECT LANGUAGE JAVASCRIPT AS\n\
         $$\n{body}$$"
    )
}
