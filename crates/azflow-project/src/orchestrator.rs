//! Batch runs over many services
//!
//! Every service runs its phases in order on its own future; the futures run concurrently
//! and a failing service does not stop the others.

use crate::container::PublishOptions;
use crate::context::{OperationContext, ServiceContext, ServicePhase};
use crate::error::Result;
use crate::progress::{ProgressSink, ServiceScopedProgress};
use crate::service_manager::{PackageOptions, ServiceManager};
use azflow_core::ServiceConfig;
use futures_util::future::join_all;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Options for the phases of a run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub package: PackageOptions,
    pub publish: PublishOptions,
}

/// Outcome of one service in a batch
#[derive(Debug)]
pub struct ServiceResult {
    pub service: String,
    pub result: Result<ServiceContext>,
}

impl ServiceResult {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

pub struct Orchestrator {
    manager: Arc<ServiceManager>,
}

impl Orchestrator {
    pub fn new(manager: Arc<ServiceManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<ServiceManager> {
        &self.manager
    }

    /// Run every phase from restore up to `through` for each service
    ///
    /// Results come back in the order of `services`.
    #[instrument(skip_all, fields(through = %through, services = services.len()))]
    pub async fn run(
        &self,
        services: &[ServiceConfig],
        through: ServicePhase,
        options: &RunOptions,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Vec<ServiceResult> {
        let runs = services.iter().map(|service| async move {
            let scoped = ServiceScopedProgress::new(progress, service.name.clone());
            let op = OperationContext::new(&scoped, cancel);
            let result = self.run_service(service, through, options, op).await;
            match &result {
                Ok(_) => info!(service = %service.name, "Service completed"),
                Err(e) => warn!(service = %service.name, error = %e, "Service failed"),
            }
            ServiceResult {
                service: service.name.clone(),
                result,
            }
        });
        join_all(runs).await
    }

    async fn run_service(
        &self,
        service: &ServiceConfig,
        through: ServicePhase,
        options: &RunOptions,
        op: OperationContext<'_>,
    ) -> Result<ServiceContext> {
        self.manager.initialize(service).await?;

        let mut ctx = ServiceContext::new();
        for phase in ServicePhase::ALL.into_iter().filter(|p| *p <= through) {
            op.report(&format!("Running {phase}"));
            match phase {
                ServicePhase::Restore => {
                    self.manager.restore(service, &mut ctx, op).await?;
                }
                ServicePhase::Build => {
                    self.manager.build(service, &mut ctx, op).await?;
                }
                ServicePhase::Package => {
                    self.manager
                        .package(service, &mut ctx, &options.package, op)
                        .await?;
                }
                ServicePhase::Publish => {
                    self.manager
                        .publish(service, &mut ctx, &options.publish, op)
                        .await?;
                }
                ServicePhase::Deploy => {
                    self.manager.deploy(service, &mut ctx, op).await?;
                }
            }
        }
        Ok(ctx)
    }
}
