//! `harness.agent.Agent` service implementation.
//!
//! Each handler decodes its request, calls the controller and encodes the
//! result. Lifecycle rules live in the controller.

use tonic::{Request, Response, Status};

use harness_core::error::HarnessError;
use harness_core::instance::InstanceId;
use harness_runtime::LifecycleController;

use crate::api::*;
use crate::convert;
use crate::error::harness_error_to_status;
use crate::rpc::agent_server::Agent;

/// Harness implementation of the Agent service.
#[derive(Clone)]
pub struct AgentService {
    controller: LifecycleController,
}

impl AgentService {
    /// Create a service backed by `controller`.
    pub fn new(controller: LifecycleController) -> Self {
        Self { controller }
    }
}

fn parse_id(id: String) -> Result<InstanceId, Status> {
    convert::instance_id(id).map_err(harness_error_to_status)
}

#[tonic::async_trait]
impl Agent for AgentService {
    async fn create_instance(
        &self,
        request: Request<CreateInstanceRequest>,
    ) -> Result<Response<CreateInstanceResponse>, Status> {
        let req = request.into_inner();
        let config = req.config.ok_or_else(|| {
            harness_error_to_status(HarnessError::invalid_config("config is required"))
        })?;
        let config = convert::config_from_api(config).map_err(harness_error_to_status)?;

        tracing::debug!(cpus = config.cpus, memory_mb = config.memory_mb, "RPC CreateInstance");

        let id = self.controller.create_instance(config).map_err(harness_error_to_status)?;
        Ok(Response::new(CreateInstanceResponse { id: id.to_string() }))
    }

    async fn list_instances(
        &self,
        request: Request<ListInstancesRequest>,
    ) -> Result<Response<ListInstancesResponse>, Status> {
        let req = request.into_inner();
        let filter = match req.state {
            Some(state) => convert::state_from_api(state).map_err(harness_error_to_status)?,
            None => None,
        };

        let instances = self
            .controller
            .list_instances()
            .iter()
            .filter(|i| filter.map_or(true, |state| i.state == state))
            .map(convert::instance_to_api)
            .collect();

        Ok(Response::new(ListInstancesResponse { instances }))
    }

    async fn get_instance(
        &self,
        request: Request<GetInstanceRequest>,
    ) -> Result<Response<GetInstanceResponse>, Status> {
        let id = parse_id(request.into_inner().id)?;
        let instance = self.controller.get_instance(&id).map_err(harness_error_to_status)?;
        Ok(Response::new(GetInstanceResponse {
            instance: Some(convert::instance_to_api(&instance)),
        }))
    }

    async fn restart(
        &self,
        request: Request<RestartRequest>,
    ) -> Result<Response<RestartResponse>, Status> {
        let id = parse_id(request.into_inner().id)?;
        tracing::debug!(instance_id = %id, "RPC Restart");
        self.controller.restart(&id).map_err(harness_error_to_status)?;
        Ok(Response::new(RestartResponse {}))
    }

    async fn terminate(
        &self,
        request: Request<TerminateRequest>,
    ) -> Result<Response<TerminateResponse>, Status> {
        let id = parse_id(request.into_inner().id)?;
        tracing::debug!(instance_id = %id, "RPC Terminate");
        self.controller.terminate(&id).map_err(harness_error_to_status)?;
        Ok(Response::new(TerminateResponse {}))
    }

    async fn inject_fault(
        &self,
        request: Request<FaultRequest>,
    ) -> Result<Response<FaultResponse>, Status> {
        let req = request.into_inner();
        let fault = convert::fault_from_api(req.fault).map_err(harness_error_to_status)?;
        let id = parse_id(req.id)?;
        tracing::debug!(instance_id = %id, fault = %fault, "RPC InjectFault");

        let instance = self
            .controller
            .inject_fault(&id, fault)
            .await
            .map_err(harness_error_to_status)?;
        Ok(Response::new(FaultResponse {
            instance: Some(convert::instance_to_api(&instance)),
        }))
    }

    async fn undo_fault(
        &self,
        request: Request<FaultRequest>,
    ) -> Result<Response<FaultResponse>, Status> {
        let req = request.into_inner();
        let fault = convert::fault_from_api(req.fault).map_err(harness_error_to_status)?;
        let id = parse_id(req.id)?;
        tracing::debug!(instance_id = %id, fault = %fault, "RPC UndoFault");

        let instance = self
            .controller
            .undo_fault(&id, fault)
            .await
            .map_err(harness_error_to_status)?;
        Ok(Response::new(FaultResponse {
            instance: Some(convert::instance_to_api(&instance)),
        }))
    }
}
