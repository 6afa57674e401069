// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

//! On-disk configuration of transport and channel parameters.

use std::path::Path;

use serde::{Deserialize, Serialize};
use uatp_types::{DecodingOptions, MessageSecurityMode};

use crate::comms::tcp_types::MIN_CHUNK_SIZE;
use crate::errors::ConfigError;

fn default_true() -> bool {
    true
}

/// Transport limits and timeouts for one connection. These are the local
/// half of the negotiation; the effective values after HEL/ACK are the
/// minimum of both sides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportLimits {
    /// Largest chunk this side is willing to receive.
    pub receive_buffer_size: usize,
    /// Largest chunk this side will send.
    pub send_buffer_size: usize,
    /// Largest reassembled message this side accepts, 0 for no limit.
    pub max_message_size: usize,
    /// Most chunks per message this side accepts, 0 for no limit.
    pub max_chunk_count: usize,
    /// Maximum length of strings in decoded messages.
    pub max_string_length: usize,
    /// Maximum length of byte strings in decoded messages.
    pub max_byte_string_length: usize,
    /// Maximum number of array elements in decoded messages.
    pub max_array_length: usize,
}

impl Default for TransportLimits {
    fn default() -> Self {
        Self {
            receive_buffer_size: u16::MAX as usize,
            send_buffer_size: u16::MAX as usize,
            max_message_size: uatp_types::constants::MAX_MESSAGE_SIZE,
            max_chunk_count: uatp_types::constants::MAX_CHUNK_COUNT,
            max_string_length: uatp_types::constants::MAX_STRING_LENGTH,
            max_byte_string_length: uatp_types::constants::MAX_BYTE_STRING_LENGTH,
            max_array_length: uatp_types::constants::MAX_ARRAY_LENGTH,
        }
    }
}

impl TransportLimits {
    /// True when the buffer sizes meet the minimum the standard requires.
    pub fn is_valid(&self) -> bool {
        self.receive_buffer_size >= MIN_CHUNK_SIZE && self.send_buffer_size >= MIN_CHUNK_SIZE
    }

    /// Decoding options carrying these limits.
    pub fn decoding_options(&self) -> DecodingOptions {
        DecodingOptions {
            max_message_size: self.max_message_size,
            max_chunk_count: self.max_chunk_count,
            max_string_length: self.max_string_length,
            max_byte_string_length: self.max_byte_string_length,
            max_array_length: self.max_array_length,
            ..Default::default()
        }
    }
}

/// Channel level configuration: which security to ask for and how long a
/// token should live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// URI of the security policy to request.
    pub security_policy_uri: String,
    /// The security mode to request.
    pub security_mode: MessageSecurityModeConfig,
    /// Requested token lifetime in milliseconds. The server may revise it.
    pub token_lifetime_ms: u32,
    /// Connect (and HEL/ACK) timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Default per-request timeout in milliseconds.
    pub request_timeout_ms: u64,
    /// Whether to retry a failed connect.
    #[serde(default = "default_true")]
    pub retry_connect: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            security_policy_uri: uatp_crypto::SecurityPolicy::None.to_uri().to_string(),
            security_mode: MessageSecurityModeConfig::None,
            token_lifetime_ms: 60_000,
            connect_timeout_ms: 5_000,
            request_timeout_ms: 30_000,
            retry_connect: true,
        }
    }
}

/// Serializable form of [`MessageSecurityMode`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MessageSecurityModeConfig {
    /// No signing or encryption.
    None,
    /// Sign only.
    Sign,
    /// Sign and encrypt.
    SignAndEncrypt,
}

impl From<MessageSecurityModeConfig> for MessageSecurityMode {
    fn from(value: MessageSecurityModeConfig) -> Self {
        match value {
            MessageSecurityModeConfig::None => MessageSecurityMode::None,
            MessageSecurityModeConfig::Sign => MessageSecurityMode::Sign,
            MessageSecurityModeConfig::SignAndEncrypt => MessageSecurityMode::SignAndEncrypt,
        }
    }
}

/// Top level transport configuration, loadable from YAML.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Connection limits.
    pub limits: TransportLimits,
    /// Channel parameters.
    pub channel: ChannelConfig,
}

impl TransportConfig {
    /// Load a configuration from a YAML file.
    pub fn load(path: &Path) -> Result<TransportConfig, ConfigError> {
        let file = std::fs::File::open(path)?;
        let config: TransportConfig = serde_yaml::from_reader(file)?;
        if !config.limits.is_valid() {
            return Err(ConfigError::Invalid(
                "Buffer sizes are below the 8192 byte minimum",
            ));
        }
        Ok(config)
    }

    /// Save the configuration to a YAML file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let file = std::fs::File::create(path)?;
        serde_yaml::to_writer(file, self)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limits_are_valid() {
        assert!(TransportLimits::default().is_valid());
    }

    #[test]
    fn undersized_buffers_are_invalid() {
        let limits = TransportLimits {
            receive_buffer_size: 4096,
            ..Default::default()
        };
        assert!(!limits.is_valid());
    }
}
