use tonic_build::manual::{Builder, Method, Service};

/// Unary method with prost messages from `crate::api`.
fn unary(name: &str, route: &str, input: &str, output: &str) -> Method {
    Method::builder()
        .name(name)
        .route_name(route)
        .input_type(format!("crate::api::{}", input))
        .output_type(format!("crate::api::{}", output))
        .codec_path("tonic::codec::ProstCodec")
        .build()
}

fn main() {
    // Messages are hand-written prost structs, so no protoc is needed.
    let service = Service::builder()
        .name("Agent")
        .package("harness.agent")
        .method(unary(
            "create_instance",
            "CreateInstance",
            "CreateInstanceRequest",
            "CreateInstanceResponse",
        ))
        .method(unary(
            "list_instances",
            "ListInstances",
            "ListInstancesRequest",
            "ListInstancesResponse",
        ))
        .method(unary(
            "get_instance",
            "GetInstance",
            "GetInstanceRequest",
            "GetInstanceResponse",
        ))
        .method(unary("restart", "Restart", "RestartRequest", "RestartResponse"))
        .method(unary(
            "terminate",
            "Terminate",
            "TerminateRequest",
            "TerminateResponse",
        ))
        .method(unary("inject_fault", "InjectFault", "FaultRequest", "FaultResponse"))
        .method(unary("undo_fault", "UndoFault", "FaultRequest", "FaultResponse"))
        .build();

    Builder::new().compile(&[service]);
}
