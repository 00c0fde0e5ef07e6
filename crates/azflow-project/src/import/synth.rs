//! Infrastructure synthesis from the `resources` graph

use crate::error::{ProjectError, Result, ResultExt};
use crate::scaffold::{
    AiModelSpec, Backend, CosmosContainerSpec, CosmosSpec, DatabaseReference, DatabaseSpec,
    EventHubsSpec, Frontend, InfraSpec, ServiceBusSpec, ServiceReference, ServiceSpec, StorageSpec,
    bicep_name,
};
use azflow_core::{
    AiModelProps, ContainerAppProps, CosmosDbProps, DatabaseProps, EventHubsProps, KafkaProps,
    ProjectConfig, ResourceConfig, ResourceType, ServiceBusProps, StorageProps, scan_references,
};
use std::collections::BTreeMap;
use tracing::{debug, warn};

const POSTGRES_ADMIN_USER: &str = "pgadmin";
const MYSQL_ADMIN_USER: &str = "mysqladmin";
const GENERATED_PASSWORD: &str = "$(secretOrRandomPassword)";

/// Build the [`InfraSpec`] for the project's resources
///
/// Compute hosts become services sorted by name. Each `uses` edge attaches a typed
/// binding to the consuming host, or a frontend/backend pair when it points at another host.
pub fn infra_spec(project: &ProjectConfig) -> Result<InfraSpec> {
    validate_uses(project)?;

    let mut spec = InfraSpec::default();
    for resource in project.resources.values() {
        add_resource(&mut spec, resource)
            .context(format!("resource '{}'", resource.name))?;
    }

    spec.services.sort_by(|a, b| a.name.cmp(&b.name));
    map_uses(&mut spec, project)?;

    debug!(
        services = spec.services.len(),
        parameters = spec.parameters.len(),
        "Synthesized infrastructure spec"
    );
    Ok(spec)
}

fn validate_uses(project: &ProjectConfig) -> Result<()> {
    for resource in project.resources.values() {
        for used in &resource.uses {
            if !project.resources.contains_key(used) && !project.services.contains_key(used) {
                return Err(ProjectError::InvalidConfig(format!(
                    "resource '{}' uses '{}', which does not exist",
                    resource.name, used
                )));
            }
        }
    }
    Ok(())
}

fn database_name(props: &DatabaseProps, resource: &ResourceConfig) -> String {
    if props.database_name.is_empty() {
        resource.name.clone()
    } else {
        props.database_name.clone()
    }
}

fn add_resource(spec: &mut InfraSpec, resource: &ResourceConfig) -> Result<()> {
    match &resource.resource_type {
        ResourceType::DbRedis => {
            spec.db_redis = Some(DatabaseSpec {
                database_name: resource.name.clone(),
                database_user: String::new(),
            });
        }
        ResourceType::DbPostgres => {
            let props: DatabaseProps = resource.typed_props()?;
            spec.db_postgres = Some(DatabaseSpec {
                database_name: database_name(&props, resource),
                database_user: POSTGRES_ADMIN_USER.to_string(),
            });
            spec.set_parameter("postgresDatabasePassword", GENERATED_PASSWORD, true);
        }
        ResourceType::DbMySql => {
            let props: DatabaseProps = resource.typed_props()?;
            spec.db_mysql = Some(DatabaseSpec {
                database_name: database_name(&props, resource),
                database_user: MYSQL_ADMIN_USER.to_string(),
            });
            spec.set_parameter("mysqlDatabasePassword", GENERATED_PASSWORD, true);
        }
        ResourceType::DbMongo => {
            let props: DatabaseProps = resource.typed_props()?;
            spec.db_cosmos_mongo = Some(DatabaseSpec {
                database_name: database_name(&props, resource),
                database_user: String::new(),
            });
        }
        ResourceType::DbCosmos => {
            let props: CosmosDbProps = resource.typed_props()?;
            spec.db_cosmos = Some(CosmosSpec {
                database_name: if props.database_name.is_empty() {
                    resource.name.clone()
                } else {
                    props.database_name
                },
                containers: props
                    .containers
                    .into_iter()
                    .map(|c| CosmosContainerSpec {
                        name: c.name,
                        partition_keys: c.partition_keys,
                    })
                    .collect(),
            });
        }
        ResourceType::MessagingServiceBus => {
            let props: ServiceBusProps = resource.typed_props()?;
            spec.service_bus = Some(ServiceBusSpec {
                queues: props.queues,
                topics: props.topics,
            });
        }
        ResourceType::MessagingEventHubs => {
            let props: EventHubsProps = resource.typed_props()?;
            spec.event_hubs = Some(EventHubsSpec {
                hubs: props.hubs,
                kafka: false,
            });
        }
        ResourceType::MessagingKafka => {
            let props: KafkaProps = resource.typed_props()?;
            spec.event_hubs = Some(EventHubsSpec {
                hubs: props.topics,
                kafka: true,
            });
        }
        ResourceType::Storage => {
            let props: StorageProps = resource.typed_props()?;
            spec.storage = Some(StorageSpec {
                containers: props.containers,
            });
        }
        ResourceType::KeyVault => spec.key_vault = true,
        ResourceType::OpenAiModel => {
            let props: AiModelProps = resource.typed_props()?;
            if props.model.name.is_empty() {
                return Err(ProjectError::InvalidConfig(format!(
                    "resources.{}.model is required",
                    resource.name
                )));
            }
            if props.model.version.is_empty() {
                return Err(ProjectError::InvalidConfig(format!(
                    "resources.{}.version is required",
                    resource.name
                )));
            }
            spec.ai_models.push(AiModelSpec {
                name: resource.name.clone(),
                model: props.model.name,
                version: props.model.version,
            });
        }
        ResourceType::HostContainerApp => {
            let service = container_app_service(spec, resource)?;
            spec.services.push(service);
        }
        ResourceType::Unknown(kind) => {
            warn!(resource = %resource.name, kind = %kind, "Skipping resource of unknown type");
        }
    }
    Ok(())
}

fn container_app_service(spec: &mut InfraSpec, resource: &ResourceConfig) -> Result<ServiceSpec> {
    let props: ContainerAppProps = resource.typed_props()?;
    let mut env = BTreeMap::new();

    for var in &props.env {
        let (value, secret) = match (var.value.is_empty(), var.secret.is_empty()) {
            (true, true) => {
                return Err(ProjectError::InvalidConfig(format!(
                    "environment variable {} for host {} is invalid: both value and secret are empty",
                    var.name, resource.name
                )));
            }
            (false, false) => {
                return Err(ProjectError::InvalidConfig(format!(
                    "environment variable {} for host {} is invalid: both value and secret are set",
                    var.name, resource.name
                )));
            }
            (false, true) => (var.value.as_str(), false),
            (true, false) => (var.secret.as_str(), true),
        };

        // every reference in a secret value is marked secret, even `${HOST}` in `${HOST}:${PASSWORD}`
        env.insert(var.name.clone(), bicep_expression(spec, value, secret));
    }

    if !(1..=65535).contains(&props.port) {
        return Err(ProjectError::InvalidConfig(format!(
            "port value {} for host {} must be between 1 and 65535",
            props.port, resource.name
        )));
    }

    Ok(ServiceSpec {
        name: resource.name.clone(),
        port: props.port,
        env,
        ..Default::default()
    })
}

/// Turn a value with `${NAME}` references into a bicep expression over generated parameters
///
/// Each referenced name is registered as a parameter whose value is the reference itself,
/// so it is resolved from the environment at provisioning time.
pub fn bicep_expression(spec: &mut InfraSpec, value: &str, secret: bool) -> String {
    let references = scan_references(value);
    for reference in &references {
        spec.set_parameter(
            &bicep_name(&reference.name),
            &value[reference.start..reference.end],
            secret,
        );
    }

    match references.as_slice() {
        [] => format!("'{}'", value),
        [only] if only.start == 0 && only.end == value.len() => bicep_name(&only.name),
        _ => {
            let mut out = String::from("'");
            let mut previous = 0;
            for reference in &references {
                out.push_str(&value[previous..reference.start]);
                out.push_str("${");
                out.push_str(&bicep_name(&reference.name));
                out.push('}');
                previous = reference.end;
            }
            out.push_str(&value[previous..]);
            out.push('\'');
            out
        }
    }
}

fn map_uses(spec: &mut InfraSpec, project: &ProjectConfig) -> Result<()> {
    let hosts: Vec<String> = spec.services.iter().map(|s| s.name.clone()).collect();

    for host in &hosts {
        let Some(resource) = project.resources.get(host) else {
            continue;
        };

        for used_name in &resource.uses {
            let Some(used) = project.resources.get(used_name) else {
                // a plain service; only the consuming side is known here
                add_backend(spec, host, used_name);
                continue;
            };

            match &used.resource_type {
                ResourceType::HostContainerApp => {
                    add_backend(spec, host, used_name);
                    add_frontend(spec, used_name, host);
                    continue;
                }
                ResourceType::Unknown(kind) => {
                    return Err(ProjectError::UnsupportedConfiguration(format!(
                        "resource '{}' uses '{}', but the type of '{}' is '{}', which is unsupported",
                        host, used_name, used_name, kind
                    )));
                }
                _ => {}
            }

            let binding = spec_binding(spec, &used.resource_type);
            let Some(service) = spec.services.iter_mut().find(|s| &s.name == host) else {
                continue;
            };
            match &used.resource_type {
                ResourceType::DbRedis => service.db_redis = binding,
                ResourceType::DbPostgres => service.db_postgres = binding,
                ResourceType::DbMySql => service.db_mysql = binding,
                ResourceType::DbMongo => service.db_cosmos_mongo = binding,
                ResourceType::DbCosmos => service.db_cosmos = binding,
                ResourceType::MessagingServiceBus => service.service_bus = true,
                ResourceType::MessagingEventHubs | ResourceType::MessagingKafka => {
                    service.event_hubs = true
                }
                ResourceType::Storage => service.storage = true,
                ResourceType::KeyVault => service.key_vault = true,
                ResourceType::OpenAiModel => service.ai_models.push(used.name.clone()),
                ResourceType::HostContainerApp | ResourceType::Unknown(_) => {}
            }
        }
    }
    Ok(())
}

fn spec_binding(spec: &InfraSpec, resource_type: &ResourceType) -> Option<DatabaseReference> {
    let database = match resource_type {
        ResourceType::DbRedis => spec.db_redis.as_ref()?,
        ResourceType::DbPostgres => spec.db_postgres.as_ref()?,
        ResourceType::DbMySql => spec.db_mysql.as_ref()?,
        ResourceType::DbMongo => spec.db_cosmos_mongo.as_ref()?,
        ResourceType::DbCosmos => {
            return spec.db_cosmos.as_ref().map(|c| DatabaseReference {
                database_name: c.database_name.clone(),
            });
        }
        _ => return None,
    };
    Some(DatabaseReference {
        database_name: database.database_name.clone(),
    })
}

fn add_backend(spec: &mut InfraSpec, frontend: &str, backend: &str) {
    if let Some(service) = spec.services.iter_mut().find(|s| s.name == frontend) {
        service
            .frontend
            .get_or_insert_with(Frontend::default)
            .backends
            .push(ServiceReference {
                name: backend.to_string(),
            });
    }
}

fn add_frontend(spec: &mut InfraSpec, backend: &str, frontend: &str) {
    if let Some(service) = spec.services.iter_mut().find(|s| s.name == backend) {
        service
            .backend
            .get_or_insert_with(Backend::default)
            .frontends
            .push(ServiceReference {
                name: frontend.to_string(),
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use azflow_core::parse_project;
    use std::path::Path;

    fn project(yaml: &str) -> ProjectConfig {
        parse_project(yaml, Path::new("/repo")).unwrap()
    }

    #[test]
    fn test_redis_without_consumer() {
        let spec = infra_spec(&project(
            r#"
name: cache-only
resources:
  cache:
    type: db.redis
"#,
        ))
        .unwrap();

        assert!(spec.db_redis.is_some());
        assert!(spec.services.is_empty());
        assert!(spec.parameters.is_empty());
    }

    #[test]
    fn test_redis_with_consumer() {
        let spec = infra_spec(&project(
            r#"
name: shop
resources:
  api:
    type: host.containerapp
    port: 3100
    uses: [cache]
  cache:
    type: db.redis
"#,
        ))
        .unwrap();

        let api = spec.service("api").unwrap();
        assert_eq!(api.port, 3100);
        assert_eq!(
            api.db_redis,
            Some(DatabaseReference {
                database_name: "cache".into()
            })
        );
        assert!(spec.db_redis.is_some());
    }

    #[test]
    fn test_frontend_backend_edges_both_sides() {
        let spec = infra_spec(&project(
            r#"
name: web
resources:
  web:
    type: host.containerapp
    uses: [api]
  api:
    type: host.containerapp
"#,
        ))
        .unwrap();

        let names: Vec<&str> = spec.services.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["api", "web"]);

        let web = spec.service("web").unwrap();
        assert_eq!(web.frontend.as_ref().unwrap().backends[0].name, "api");
        assert!(web.backend.is_none());

        let api = spec.service("api").unwrap();
        assert_eq!(api.backend.as_ref().unwrap().frontends[0].name, "web");
        assert!(api.frontend.is_none());
    }

    #[test]
    fn test_dangling_uses_names_both_ends() {
        let err = infra_spec(&project(
            r#"
name: broken
resources:
  api:
    type: host.containerapp
    uses: [db]
"#,
        ))
        .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("'api'"));
        assert!(message.contains("'db'"));
    }

    #[test]
    fn test_env_values_become_parameters() {
        let spec = infra_spec(&project(
            r#"
name: params
resources:
  api:
    type: host.containerapp
    env:
      - name: PLAIN
        value: hello
      - name: HOST
        value: ${DB_HOST}
      - name: CONNECTION
        secret: ${DB_HOST}:${DB_PASSWORD}
"#,
        ))
        .unwrap();

        let api = spec.service("api").unwrap();
        assert_eq!(api.env["PLAIN"], "'hello'");
        assert_eq!(api.env["HOST"], "dbHost");
        assert_eq!(api.env["CONNECTION"], "'${dbHost}:${dbPassword}'");

        let host = spec.parameters.iter().find(|p| p.name == "dbHost").unwrap();
        assert_eq!(host.value, "${DB_HOST}");
        // used inside a secret, so it is escalated
        assert!(host.secret);
        assert!(spec.parameters.iter().any(|p| p.name == "dbPassword" && p.secret));
    }

    #[test]
    fn test_env_var_needs_exactly_one_of_value_and_secret() {
        let err = infra_spec(&project(
            r#"
name: params
resources:
  api:
    type: host.containerapp
    env:
      - name: EMPTY
"#,
        ))
        .unwrap_err();
        assert!(err.to_string().contains("both value and secret are empty"));
    }

    #[test]
    fn test_port_out_of_range() {
        let err = infra_spec(&project(
            r#"
name: params
resources:
  api:
    type: host.containerapp
    port: 70000
"#,
        ))
        .unwrap_err();
        assert!(
            err.to_string()
                .contains("port value 70000 for host api must be between 1 and 65535")
        );
    }

    #[test]
    fn test_ai_model_requires_version() {
        let err = infra_spec(&project(
            r#"
name: chat
resources:
  chat:
    type: ai.openai.model
    model:
      name: gpt-4o
"#,
        ))
        .unwrap_err();
        assert!(err.to_string().contains("resources.chat.version is required"));
    }

    #[test]
    fn test_bicep_expression_keeps_surrounding_text() {
        let mut spec = InfraSpec::default();
        assert_eq!(
            bicep_expression(&mut spec, "https://${API_HOST}/v1", false),
            "'https://${apiHost}/v1'"
        );
        assert_eq!(spec.parameters[0].value, "${API_HOST}");
    }
}
