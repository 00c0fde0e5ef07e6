//! Infrastructure scaffolding
//!
//! An [`InfraSpec`] describes the infrastructure synthesized from the resource graph (or an
//! app host manifest). [`exec_infra`] renders it through the bundled tera templates into
//! a [`MemoryFs`] of bicep files.

mod funcs;
mod memfs;

pub use funcs::{alpha_snake_upper, bicep_name, bicep_name_infix, container_app_name};
pub use memfs::MemoryFs;

use crate::error::Result;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tera::{Context, Tera, Value};
use tracing::debug;

const MAIN_BICEP: &str = include_str!("../../templates/main.bicep");
const MAIN_PARAMETERS: &str = include_str!("../../templates/main.parameters.json");
const RESOURCES_BICEP: &str = include_str!("../../templates/resources.bicep");
const SERVICE_BICEP: &str = include_str!("../../templates/app/service.bicep");
const CONTAINER_APP_MANIFEST: &str = include_str!("../../templates/app/containerapp.tmpl.yaml");

/// Generated infrastructure parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Parameter {
    pub name: String,
    pub value: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub secret: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DatabaseReference {
    pub database_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceReference {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Frontend {
    pub backends: Vec<ServiceReference>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Backend {
    pub frontends: Vec<ServiceReference>,
}

/// One compute host and what it is wired to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServiceSpec {
    pub name: String,
    pub port: i64,
    /// Environment variable → bicep expression
    pub env: BTreeMap<String, String>,
    pub frontend: Option<Frontend>,
    pub backend: Option<Backend>,

    pub db_redis: Option<DatabaseReference>,
    pub db_postgres: Option<DatabaseReference>,
    pub db_mysql: Option<DatabaseReference>,
    pub db_cosmos_mongo: Option<DatabaseReference>,
    pub db_cosmos: Option<DatabaseReference>,
    pub service_bus: bool,
    pub event_hubs: bool,
    pub storage: bool,
    pub key_vault: bool,
    pub ai_models: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DatabaseSpec {
    pub database_name: String,
    pub database_user: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CosmosSpec {
    pub database_name: String,
    pub containers: Vec<CosmosContainerSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CosmosContainerSpec {
    pub name: String,
    pub partition_keys: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServiceBusSpec {
    pub queues: Vec<String>,
    pub topics: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EventHubsSpec {
    pub hubs: Vec<String>,
    pub kafka: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StorageSpec {
    pub containers: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AiModelSpec {
    pub name: String,
    pub model: String,
    pub version: String,
}

/// Everything the templates need to render the infrastructure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InfraSpec {
    pub parameters: Vec<Parameter>,
    pub services: Vec<ServiceSpec>,

    pub db_redis: Option<DatabaseSpec>,
    pub db_postgres: Option<DatabaseSpec>,
    pub db_mysql: Option<DatabaseSpec>,
    pub db_cosmos_mongo: Option<DatabaseSpec>,
    pub db_cosmos: Option<CosmosSpec>,
    pub service_bus: Option<ServiceBusSpec>,
    pub event_hubs: Option<EventHubsSpec>,
    pub storage: Option<StorageSpec>,
    pub key_vault: bool,
    pub ai_models: Vec<AiModelSpec>,
}

impl InfraSpec {
    /// Register a generated parameter
    ///
    /// A parameter used as a secret anywhere stays secret. Registering the same name
    /// with a different value is a bug in the synthesis and panics.
    pub fn set_parameter(&mut self, name: &str, value: &str, secret: bool) {
        if let Some(existing) = self.parameters.iter_mut().find(|p| p.name == name) {
            existing.secret |= secret;
            if existing.value != value {
                panic!(
                    "parameter collision: parameter {} already set to {}, cannot set to {}",
                    name, existing.value, value
                );
            }
            return;
        }

        self.parameters.push(Parameter {
            name: name.to_string(),
            value: value.to_string(),
            kind: "string".to_string(),
            secret,
        });
    }

    pub fn service(&self, name: &str) -> Option<&ServiceSpec> {
        self.services.iter().find(|s| s.name == name)
    }

    /// Whether anything at all would be generated
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
            && self.db_redis.is_none()
            && self.db_postgres.is_none()
            && self.db_mysql.is_none()
            && self.db_cosmos_mongo.is_none()
            && self.db_cosmos.is_none()
            && self.service_bus.is_none()
            && self.event_hubs.is_none()
            && self.storage.is_none()
            && !self.key_vault
            && self.ai_models.is_empty()
    }
}

fn string_filter(
    f: fn(&str) -> String,
) -> impl Fn(&Value, &HashMap<String, Value>) -> tera::Result<Value> + Send + Sync + 'static {
    move |value, _| {
        let text = tera::try_get_value!("name_filter", "value", String, value);
        Ok(Value::String(f(&text)))
    }
}

/// Tera instance with the bundled templates and the naming filters
pub fn load() -> Result<Tera> {
    let mut tera = Tera::default();
    tera.add_raw_templates(vec![
        ("main.bicep", MAIN_BICEP),
        ("main.parameters.json", MAIN_PARAMETERS),
        ("resources.bicep", RESOURCES_BICEP),
        ("app/service.bicep", SERVICE_BICEP),
        ("app/containerapp.tmpl.yaml", CONTAINER_APP_MANIFEST),
    ])?;
    tera.register_filter("bicep_name", string_filter(bicep_name));
    tera.register_filter("bicep_name_infix", string_filter(bicep_name_infix));
    tera.register_filter("alpha_snake_upper", string_filter(alpha_snake_upper));
    tera.register_filter("container_app_name", string_filter(container_app_name));
    // generated files are not HTML
    tera.autoescape_on(vec![]);
    Ok(tera)
}

/// Render the infrastructure for `spec` with `module` as the root module name
///
/// Paths are relative to the infra folder.
pub fn exec_infra(tera: &Tera, spec: &InfraSpec, module: &str) -> Result<MemoryFs> {
    let context = Context::from_serialize(spec)?;
    let mut files = MemoryFs::new();

    files.write(format!("{}.bicep", module), tera.render("main.bicep", &context)?);
    files.write(
        format!("{}.parameters.json", module),
        tera.render("main.parameters.json", &context)?,
    );
    files.write("resources.bicep", tera.render("resources.bicep", &context)?);

    for service in &spec.services {
        let mut context = context.clone();
        context.insert("service", service);
        files.write(
            format!("app/{}.bicep", service.name),
            tera.render("app/service.bicep", &context)?,
        );
    }

    debug!(files = files.len(), services = spec.services.len(), "Rendered infrastructure");
    Ok(files)
}

/// Deployment manifest for one container app, with `{{ .Env.X }}` style placeholders
/// resolved at deploy time
pub fn container_app_manifest(tera: &Tera, service: &ServiceSpec) -> Result<String> {
    let mut context = Context::new();
    context.insert("service", service);
    Ok(tera.render("app/containerapp.tmpl.yaml", &context)?)
}
