//! Mapping of kube-rs failures onto [`ClientError`].

use once_cell::sync::Lazy;
use regex::Regex;

use cutover_core::ClientError;

static CERT_SIGNATURE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(
        r"(?i)(x509|self[ -]signed|unknown ?issuer|invalid peer certificate|certificate verify failed|certificate has expired|certificate is not trusted|unable to get local issuer|ERR_CERT_)",
    )
    .ok()
});

static TIMEOUT_SIGNATURE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)(timed out|timeout|deadline exceeded)").ok());

fn matches(re: &Lazy<Option<Regex>>, text: &str) -> bool {
    re.as_ref().map(|r| r.is_match(text)).unwrap_or(false)
}

/// Classify a non-HTTP failure by its message.
pub fn classify_transport(url: &str, text: &str) -> ClientError {
    if matches(&CERT_SIGNATURE, text) {
        ClientError::CertificateTrust { url: url.to_string(), message: text.to_string() }
    } else if matches(&TIMEOUT_SIGNATURE, text) {
        ClientError::Timeout(text.to_string())
    } else {
        ClientError::Transport(text.to_string())
    }
}

/// Classify an API status response.
pub fn from_status(code: u16, message: &str) -> ClientError {
    match code {
        404 => ClientError::NotFound(message.to_string()),
        401 | 403 => ClientError::Unauthorized(message.to_string()),
        409 => ClientError::Conflict(message.to_string()),
        400 | 422 => ClientError::Invalid(message.to_string()),
        408 | 504 => ClientError::Timeout(message.to_string()),
        _ => ClientError::Transport(format!("{} ({})", message, code)),
    }
}

pub fn from_kube(url: &str, err: kube::Error) -> ClientError {
    match err {
        kube::Error::Api(ae) => from_status(ae.code, &ae.message),
        other => classify_transport(url, &error_chain(&other)),
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut cur = err.source();
    while let Some(e) = cur {
        out.push_str(": ");
        out.push_str(&e.to_string());
        cur = e.source();
    }
    out
}
