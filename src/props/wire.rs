// src/props/wire.rs

//! Reserved values of the property wire format.

/// String standing in for a value that is not known yet.
pub const UNKNOWN_VALUE: &str = "04da6b54-80e4-46f7-96ec-b56ff0331ba9";

/// Key marking an object as a special encoded value.
pub const SIG_KEY: &str = "4dabf18193072939515e22adb298388d";

pub const SECRET_SIG: &str = "1b47061264138c4ac30d75fd1eb44270";
pub const RESOURCE_REFERENCE_SIG: &str = "5cf8f73096256a8f31e491e813e4eb8e";
pub const OUTPUT_VALUE_SIG: &str = "d0e6a833031e9bbcd3f4e8bde6ca49a4";
pub const ASSET_SIG: &str = "c44067f5952c0a294b673a41bacd8c17";
pub const ARCHIVE_SIG: &str = "0def7320c3a5731c473e5ecbe6d01bc7";

/// What the engine on the other side understands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WireOptions {
    /// Encode secrets as signed objects instead of plain values.
    pub keep_secrets: bool,
    /// Encode resources as references instead of bare ids/URNs.
    pub keep_resources: bool,
    /// Encode outputs as output-value objects (remote components only).
    pub keep_output_values: bool,
}
