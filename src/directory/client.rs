//! Outbound HTTP client construction.

use reqwest::Client;
use tracing::{debug, warn};

use crate::Result;
use crate::config::DirectoryConfig;
use crate::mtls::ClientIdentity;

/// `User-Agent` sent on every outbound request.
pub const USER_AGENT: &str = concat!("tfaas-server/", env!("CARGO_PKG_VERSION"));

/// Build the client used for identity directory calls.
///
/// Without an identity this is a plain client with default server
/// verification. With one, the identity is presented on every handshake and,
/// if `config.insecure_skip_verify` is set, the server's certificate is not
/// verified.
///
/// # Errors
///
/// `Error::Credential` if the identity cannot be used by the TLS backend,
/// `Error::Http` if the client cannot be built.
pub fn build_client(identity: Option<&ClientIdentity>, config: &DirectoryConfig) -> Result<Client> {
    let builder = Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(config.timeout)
        .timeout(config.timeout);

    let Some(identity) = identity else {
        debug!("Directory client built without client certificate");
        return Ok(builder.build()?);
    };

    let mut builder = builder.identity(identity.to_reqwest_identity()?);
    if config.insecure_skip_verify {
        warn!(
            subject = %identity.subject(),
            "Directory server certificate verification DISABLED (directory.insecure_skip_verify)"
        );
        builder = builder.danger_accept_invalid_certs(true);
    }

    debug!(subject = %identity.subject(), "Directory client built with client certificate");
    Ok(builder.build()?)
}
