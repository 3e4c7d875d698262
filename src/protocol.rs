use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};

/// Known SwitchBot protocol endpoints.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, EnumIter, Display)]
pub enum EndpointId {
    /// SwitchBot primary control service.
    #[strum(to_string = "control_service")]
    ControlService,
    /// Characteristic used for command and status-query writes.
    #[strum(to_string = "command_characteristic")]
    CommandCharacteristic,
    /// Characteristic carrying battery/firmware status notifications.
    #[strum(to_string = "status_characteristic")]
    StatusCharacteristic,
}

/// Descriptive metadata for one protocol endpoint.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) struct EndpointMetadata {
    name: &'static str,
    uuid: &'static str,
}

impl EndpointMetadata {
    /// Human-readable endpoint name.
    pub(crate) fn name(self) -> &'static str {
        self.name
    }

    /// Endpoint UUID.
    pub(crate) fn uuid(self) -> &'static str {
        self.uuid
    }
}

/// Returns metadata for one endpoint.
pub(crate) fn endpoint_metadata(endpoint: EndpointId) -> EndpointMetadata {
    match endpoint {
        EndpointId::ControlService => EndpointMetadata {
            name: "SwitchBot control service",
            uuid: "cba20d00-224d-11e6-9fb8-0002a5d5c51b",
        },
        EndpointId::CommandCharacteristic => EndpointMetadata {
            name: "SwitchBot command",
            uuid: "cba20002-224d-11e6-9fb8-0002a5d5c51b",
        },
        EndpointId::StatusCharacteristic => EndpointMetadata {
            name: "SwitchBot status notify",
            uuid: "cba20003-224d-11e6-9fb8-0002a5d5c51b",
        },
    }
}

/// Returns the characteristic endpoints that must be resolved on connect.
pub(crate) fn characteristic_endpoints() -> impl Iterator<Item = EndpointId> {
    EndpointId::iter().filter(|endpoint| !matches!(endpoint, EndpointId::ControlService))
}

/// Maps a UUID back to its endpoint, ignoring case.
pub(crate) fn endpoint_for_uuid(uuid: &str) -> Option<EndpointId> {
    EndpointId::iter().find(|endpoint| {
        endpoint_metadata(*endpoint)
            .uuid()
            .eq_ignore_ascii_case(uuid)
    })
}
