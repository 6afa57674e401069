// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

//! Endpoint url parsing helpers.

use log::error;
use uatp_types::{Error, StatusCode};
use url::Url;

/// The url scheme of the binary TCP transport.
pub const OPC_TCP_SCHEME: &str = "opc.tcp";

/// Parse an `opc.tcp://` endpoint url into a `Url`.
pub fn opc_url_from_str(s: &str) -> Result<Url, Error> {
    let url = Url::parse(s).map_err(|err| {
        error!("Cannot parse url \"{}\", error = {:?}", s, err);
        Error::new(StatusCode::BadTcpEndpointUrlInvalid, "Cannot parse url")
    })?;
    if url.scheme() != OPC_TCP_SCHEME {
        return Err(Error::new(
            StatusCode::BadTcpEndpointUrlInvalid,
            format!("Url \"{}\" does not have the {} scheme", s, OPC_TCP_SCHEME),
        ));
    }
    Ok(url)
}

/// The hostname and port of an endpoint url, using `default_port` when the
/// url has none.
pub fn hostname_port_from_url(s: &str, default_port: u16) -> Result<(String, u16), Error> {
    let url = opc_url_from_str(s)?;
    let host = url
        .host_str()
        .ok_or_else(|| {
            Error::new(
                StatusCode::BadTcpEndpointUrlInvalid,
                format!("Url \"{}\" has no host", s),
            )
        })?
        .to_string();
    Ok((host, url.port().unwrap_or(default_port)))
}

#[cfg(test)]
mod tests {
    use super::hostname_port_from_url;

    #[test]
    fn hostname_and_port() {
        assert_eq!(
            hostname_port_from_url("opc.tcp://foo:123/endpoint", 4840).unwrap(),
            ("foo".to_string(), 123)
        );
        assert_eq!(
            hostname_port_from_url("opc.tcp://foo", 4840).unwrap(),
            ("foo".to_string(), 4840)
        );
        assert!(hostname_port_from_url("http://foo", 4840).is_err());
        assert!(hostname_port_from_url("not a url", 4840).is_err());
    }
}
