//! End-to-end tests over a real TCP gRPC connection.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tonic::transport::Channel;
use tonic::Code;

use harness_agent::api::*;
use harness_agent::error::ERROR_KIND_HEADER;
use harness_agent::{AgentClient, AgentServer};
use harness_core::config::LimitsConfig;
use harness_core::event::EventEmitter;
use harness_runtime::{InstanceRegistry, LifecycleController, RetryPolicy, SimulatedProvisioner};

fn kind(status: &tonic::Status) -> &str {
    status
        .metadata()
        .get(ERROR_KIND_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

struct TestAgent {
    client: AgentClient<Channel>,
    shutdown: oneshot::Sender<()>,
    server: tokio::task::JoinHandle<()>,
}

impl TestAgent {
    async fn start() -> Self {
        let controller = LifecycleController::new(
            Arc::new(InstanceRegistry::new()),
            Arc::new(SimulatedProvisioner::instant()),
            RetryPolicy::none(),
            LimitsConfig::default(),
            EventEmitter::default(),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();

        let server = tokio::spawn(async move {
            AgentServer::new(controller)
                .serve_tcp(listener, async {
                    let _ = rx.await;
                })
                .await
                .unwrap();
        });

        let client = AgentClient::connect(format!("http://{}", addr))
            .await
            .unwrap();

        Self {
            client,
            shutdown: tx,
            server,
        }
    }

    async fn stop(self) {
        let TestAgent {
            client,
            shutdown,
            server,
        } = self;
        drop(client);
        let _ = shutdown.send(());
        server.await.unwrap();
    }

    async fn create(&mut self, cpus: u32, memory_mb: u32) -> String {
        self.client
            .create_instance(CreateInstanceRequest {
                config: Some(InstanceConfig {
                    cpus,
                    memory_mb,
                    ..Default::default()
                }),
            })
            .await
            .unwrap()
            .into_inner()
            .id
    }

    async fn get(&mut self, id: &str) -> Instance {
        self.client
            .get_instance(GetInstanceRequest { id: id.to_string() })
            .await
            .unwrap()
            .into_inner()
            .instance
            .unwrap()
    }

    async fn wait_for(&mut self, id: &str, state: InstanceState) -> Instance {
        for _ in 0..400 {
            let instance = self.get(id).await;
            if instance.state == state as i32 {
                return instance;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("instance {id} never reached {state:?}");
    }
}

#[tokio::test]
async fn test_instance_lifecycle_over_grpc() {
    let mut agent = TestAgent::start().await;

    let id = agent.create(2, 2048).await;
    assert!(!id.is_empty());

    let running = agent.wait_for(&id, InstanceState::Running).await;
    assert_eq!(running.version, 2);
    let endpoint = running.endpoint.unwrap();
    assert_eq!(endpoint.address, "localhost");
    assert_eq!(endpoint.port, 9000);
    assert_eq!(running.config.unwrap().cpus, 2);

    agent
        .client
        .restart(RestartRequest { id: id.clone() })
        .await
        .unwrap();
    let restarted = agent.wait_for(&id, InstanceState::Running).await;
    assert_eq!(restarted.version, 4);

    agent
        .client
        .terminate(TerminateRequest { id: id.clone() })
        .await
        .unwrap();
    let terminated = agent.get(&id).await;
    assert_eq!(terminated.state, InstanceState::Terminated as i32);
    assert!(terminated.terminated_at.is_some());

    agent.stop().await;
}

#[tokio::test]
async fn test_list_instances_over_grpc() {
    let mut agent = TestAgent::start().await;

    let a = agent.create(1, 512).await;
    let b = agent.create(1, 512).await;
    agent.wait_for(&a, InstanceState::Running).await;
    agent.wait_for(&b, InstanceState::Running).await;

    let all = agent
        .client
        .list_instances(ListInstancesRequest { state: None })
        .await
        .unwrap()
        .into_inner()
        .instances;
    let ids: Vec<&str> = all.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&a.as_str()));
    assert!(ids.contains(&b.as_str()));

    let pending = agent
        .client
        .list_instances(ListInstancesRequest {
            state: Some(InstanceState::Pending as i32),
        })
        .await
        .unwrap()
        .into_inner()
        .instances;
    assert!(pending.is_empty());

    agent.stop().await;
}

#[tokio::test]
async fn test_errors_carry_status_and_kind() {
    let mut agent = TestAgent::start().await;

    let status = agent
        .client
        .create_instance(CreateInstanceRequest {
            config: Some(InstanceConfig::default()),
        })
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);
    assert_eq!(kind(&status), "invalid_config");

    let status = agent
        .client
        .restart(RestartRequest {
            id: "does-not-exist".to_string(),
        })
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::NotFound);
    assert_eq!(kind(&status), "not_found");

    let id = agent.create(1, 512).await;
    agent.wait_for(&id, InstanceState::Running).await;
    agent
        .client
        .terminate(TerminateRequest { id: id.clone() })
        .await
        .unwrap();
    let status = agent
        .client
        .restart(RestartRequest { id })
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::FailedPrecondition);
    assert_eq!(kind(&status), "invalid_state");

    agent.stop().await;
}

#[tokio::test]
async fn test_fault_injection_over_grpc() {
    let mut agent = TestAgent::start().await;
    let id = agent.create(1, 512).await;
    agent.wait_for(&id, InstanceState::Running).await;

    let injected = agent
        .client
        .inject_fault(FaultRequest {
            id: id.clone(),
            fault: FaultType::Jitter as i32,
        })
        .await
        .unwrap()
        .into_inner()
        .instance
        .unwrap();
    assert_eq!(injected.faults, vec![FaultType::Jitter as i32]);

    let undone = agent
        .client
        .undo_fault(FaultRequest {
            id,
            fault: FaultType::Jitter as i32,
        })
        .await
        .unwrap()
        .into_inner()
        .instance
        .unwrap();
    assert!(undone.faults.is_empty());

    agent.stop().await;
}
