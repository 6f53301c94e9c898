//! Agent-specific error conversions.

use harness_core::error::HarnessError;
use tonic::metadata::MetadataValue;
use tonic::Status;

/// Metadata key carrying [`HarnessError::kind`] on every error status.
pub const ERROR_KIND_HEADER: &str = "x-harness-error-kind";

/// Convert a HarnessError to a gRPC Status.
pub fn harness_error_to_status(err: HarnessError) -> Status {
    let kind = err.kind();
    let mut status = match err {
        HarnessError::InvalidConfig(msg) => Status::invalid_argument(msg),
        HarnessError::NotFound(id) => Status::not_found(format!("instance {} not found", id)),
        e @ HarnessError::InvalidState { .. } => Status::failed_precondition(e.to_string()),
        HarnessError::Provisioner(msg) => Status::unavailable(msg),
        HarnessError::InternalInvariant(msg) => {
            tracing::error!(error = %msg, "Internal invariant violated");
            Status::internal("internal server error")
        }
        e @ HarnessError::VersionConflict { .. } => Status::aborted(e.to_string()),
        HarnessError::DuplicateId(id) => {
            Status::already_exists(format!("instance {} already exists", id))
        }
        other => Status::internal(other.to_string()),
    };
    status
        .metadata_mut()
        .insert(ERROR_KIND_HEADER, MetadataValue::from_static(kind));
    status
}

#[cfg(test)]
mod tests {
    use super::*;
    use harness_core::instance::InstanceState;
    use tonic::Code;

    fn kind_of(status: &Status) -> &str {
        status
            .metadata()
            .get(ERROR_KIND_HEADER)
            .unwrap()
            .to_str()
            .unwrap()
    }

    #[test]
    fn test_invalid_config_maps_to_invalid_argument() {
        let status = harness_error_to_status(HarnessError::invalid_config("cpus is required"));
        assert_eq!(status.code(), Code::InvalidArgument);
        assert_eq!(status.message(), "cpus is required");
        assert_eq!(kind_of(&status), "invalid_config");
    }

    #[test]
    fn test_not_found_maps_to_not_found() {
        let status = harness_error_to_status(HarnessError::NotFound("i-1".to_string()));
        assert_eq!(status.code(), Code::NotFound);
        assert!(status.message().contains("i-1"));
        assert_eq!(kind_of(&status), "not_found");
    }

    #[test]
    fn test_invalid_state_maps_to_failed_precondition() {
        let status = harness_error_to_status(HarnessError::InvalidState {
            id: "i-1".to_string(),
            state: InstanceState::Pending,
            operation: "restart",
        });
        assert_eq!(status.code(), Code::FailedPrecondition);
        assert_eq!(status.message(), "Cannot restart instance i-1 in state pending");
    }

    #[test]
    fn test_provisioner_maps_to_unavailable() {
        let status = harness_error_to_status(HarnessError::provisioner("host down"));
        assert_eq!(status.code(), Code::Unavailable);
        assert_eq!(kind_of(&status), "provisioner");
    }

    #[test]
    fn test_internal_invariant_hides_details() {
        let status = harness_error_to_status(HarnessError::internal("registry corrupted"));
        assert_eq!(status.code(), Code::Internal);
        assert_eq!(status.message(), "internal server error");
        assert_eq!(kind_of(&status), "internal_invariant");
    }

    #[test]
    fn test_version_conflict_maps_to_aborted() {
        let status = harness_error_to_status(HarnessError::VersionConflict {
            id: "i-1".to_string(),
            expected: 1,
            actual: 2,
        });
        assert_eq!(status.code(), Code::Aborted);
    }

    #[test]
    fn test_duplicate_id_maps_to_already_exists() {
        let status = harness_error_to_status(HarnessError::DuplicateId("i-1".to_string()));
        assert_eq!(status.code(), Code::AlreadyExists);
    }

    #[test]
    fn test_other_errors_map_to_internal() {
        let status = harness_error_to_status(HarnessError::Config("bad".to_string()));
        assert_eq!(status.code(), Code::Internal);
        assert_eq!(kind_of(&status), "config");
    }
}
