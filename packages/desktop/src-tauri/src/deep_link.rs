use std::fmt;

use url::Url;

use crate::logging::ErrorSink;

#[derive(Debug)]
pub enum DeepLinkError {
    Malformed(url::ParseError),
    OffOrigin(String),
}

impl fmt::Display for DeepLinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeepLinkError::Malformed(err) => write!(f, "malformed deep link: {err}"),
            DeepLinkError::OffOrigin(target) => {
                write!(f, "deep link resolved outside the app origin: {target}")
            }
        }
    }
}

impl std::error::Error for DeepLinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DeepLinkError::Malformed(err) => Some(err),
            DeepLinkError::OffOrigin(_) => None,
        }
    }
}

/// Rewrites `<scheme>://<host>/<path>?<query>#<fragment>` into a URL on the
/// app origin, with `<host>` becoming the first path segment.
#[derive(Debug, Clone)]
pub struct DeepLinkTranslator {
    prefix: String,
    base: Url,
}

impl DeepLinkTranslator {
    pub fn new(scheme: &str, base: Url) -> Self {
        Self {
            prefix: format!("{scheme}://"),
            base,
        }
    }

    pub fn matches(&self, raw: &str) -> bool {
        raw.starts_with(&self.prefix)
    }

    pub fn translate(&self, raw: &str) -> Result<Option<Url>, DeepLinkError> {
        if !self.matches(raw) {
            return Ok(None);
        }

        let parsed = Url::parse(raw).map_err(DeepLinkError::Malformed)?;
        let origin = self.base.origin();

        let mut target = origin.ascii_serialization();
        if let Some(host) = parsed.host_str().filter(|host| !host.is_empty()) {
            target.push('/');
            target.push_str(host);
        }
        match parsed.path() {
            "" => target.push('/'),
            path => target.push_str(path),
        }
        if let Some(query) = parsed.query().filter(|query| !query.is_empty()) {
            target.push('?');
            target.push_str(query);
        }
        if let Some(fragment) = parsed.fragment().filter(|fragment| !fragment.is_empty()) {
            target.push('#');
            target.push_str(fragment);
        }

        let resolved = Url::parse(&target).map_err(DeepLinkError::Malformed)?;
        if resolved.origin() != origin {
            return Err(DeepLinkError::OffOrigin(target));
        }
        Ok(Some(resolved))
    }

    /// Never fails: anything that cannot be translated is reported to `sink`
    /// and dropped.
    pub fn translate_or_ignore(&self, raw: &str, sink: &dyn ErrorSink) -> Option<Url> {
        match self.translate(raw) {
            Ok(target) => target,
            Err(err) => {
                sink.suppressed("deep-link", &format!("Ignoring {raw:?}: {err}"));
                None
            }
        }
    }

    pub fn find_in_args<'a>(&self, args: &'a [String]) -> Option<&'a str> {
        args.iter()
            .map(|arg| arg.trim())
            .find(|arg| self.matches(arg))
    }
}
