//! Minimal XML-RPC client used by remote wiki repositories.
//!
//! Only the shapes the rendered-specification call needs are supported:
//! string, boolean and array parameters, and a string (or untyped) result.
use regex::Regex;
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use thiserror::Error;

/// A single XML-RPC parameter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcValue {
    String(String),
    Boolean(bool),
    Array(Vec<RpcValue>),
}

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("remote fault {code}: {message}")]
    Fault { code: i64, message: String },
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Anything able to perform one remote procedure call.
pub trait RpcTransport: Send + Sync {
    fn call(&self, method: &str, params: &[RpcValue]) -> Result<String, RemoteError>;
}

/// XML-RPC over HTTP POST with a global per-call timeout.
pub struct XmlRpcTransport {
    endpoint: String,
    timeout: Duration,
    agent: ureq::Agent,
}

impl XmlRpcTransport {
    pub fn new(endpoint: &str, timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(true)
            .build()
            .into();
        Self {
            endpoint: endpoint.to_string(),
            timeout,
            agent,
        }
    }
}

impl RpcTransport for XmlRpcTransport {
    fn call(&self, method: &str, params: &[RpcValue]) -> Result<String, RemoteError> {
        let body = encode_call(method, params);
        let start = Instant::now();
        let mut response = self
            .agent
            .post(&self.endpoint)
            .header("Content-Type", "text/xml")
            .send(body.as_bytes())
            .map_err(|err| self.map_error(err))?;
        let text = response
            .body_mut()
            .read_to_string()
            .map_err(|err| self.map_error(err))?;
        tracing::debug!(
            endpoint = %self.endpoint,
            method,
            elapsed_ms = start.elapsed().as_millis() as u64,
            response_bytes = text.len(),
            "xml-rpc call complete"
        );
        decode_response(&text)
    }
}

impl XmlRpcTransport {
    fn map_error(&self, err: ureq::Error) -> RemoteError {
        match err {
            ureq::Error::Timeout(_) => RemoteError::Timeout(self.timeout),
            other => RemoteError::Transport(other.to_string()),
        }
    }
}

/// Serialize a `methodCall` document.
pub fn encode_call(method: &str, params: &[RpcValue]) -> String {
    let mut out = String::from("<?xml version=\"1.0\"?>\n<methodCall><methodName>");
    out.push_str(&escape_xml(method));
    out.push_str("</methodName><params>");
    for param in params {
        out.push_str("<param>");
        encode_value(&mut out, param);
        out.push_str("</param>");
    }
    out.push_str("</params></methodCall>\n");
    out
}

fn encode_value(out: &mut String, value: &RpcValue) {
    out.push_str("<value>");
    match value {
        RpcValue::String(text) => {
            out.push_str("<string>");
            out.push_str(&escape_xml(text));
            out.push_str("</string>");
        }
        RpcValue::Boolean(flag) => {
            out.push_str(if *flag {
                "<boolean>1</boolean>"
            } else {
                "<boolean>0</boolean>"
            });
        }
        RpcValue::Array(items) => {
            out.push_str("<array><data>");
            for item in items {
                encode_value(out, item);
            }
            out.push_str("</data></array>");
        }
    }
    out.push_str("</value>");
}

fn fault_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<methodResponse>\s*<fault>.*</fault>\s*</methodResponse>")
            .expect("regex for xml-rpc faults")
    })
}

fn member_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?s)<member>\s*<name>\s*([A-Za-z]+)\s*</name>\s*<value>\s*(?:<(?:int|i4|string)>)?(.*?)(?:</(?:int|i4|string)>)?\s*</value>\s*</member>",
        )
        .expect("regex for xml-rpc fault members")
    })
}

fn param_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<params>\s*<param>\s*<value>(.*)</value>\s*</param>\s*</params>")
            .expect("regex for xml-rpc result parameter")
    })
}

fn string_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)^\s*<string>(.*)</string>\s*$").expect("regex for xml-rpc strings")
    })
}

/// Extract the string result (or fault) from a `methodResponse` document.
pub fn decode_response(text: &str) -> Result<String, RemoteError> {
    if let Some(fault) = fault_re().find(text) {
        let mut code = 0;
        let mut message = String::new();
        for caps in member_re().captures_iter(fault.as_str()) {
            match &caps[1] {
                "faultCode" => code = caps[2].trim().parse().unwrap_or(0),
                "faultString" => message = unescape_xml(&caps[2]),
                _ => {}
            }
        }
        return Err(RemoteError::Fault { code, message });
    }
    let Some(caps) = param_re().captures(text) else {
        return Err(RemoteError::Malformed(
            "methodResponse has no result parameter".to_string(),
        ));
    };
    let raw = &caps[1];
    if raw.trim() == "<string/>" {
        return Ok(String::new());
    }
    if let Some(inner) = string_re().captures(raw) {
        return Ok(unescape_xml(&inner[1]));
    }
    if raw.trim_start().starts_with('<') && !raw.contains("<![CDATA[") {
        return Err(RemoteError::Malformed(
            "result parameter is not a string".to_string(),
        ));
    }
    // Untyped values default to string.
    Ok(unescape_xml(raw))
}

pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

pub fn unescape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(['&', '<']) {
        out.push_str(&rest[..start]);
        rest = &rest[start..];
        if let Some(cdata) = rest.strip_prefix("<![CDATA[") {
            if let Some(end) = cdata.find("]]>") {
                out.push_str(&cdata[..end]);
                rest = &cdata[end + 3..];
                continue;
            }
        }
        if rest.starts_with('<') {
            out.push('<');
            rest = &rest[1..];
            continue;
        }
        let Some(end) = rest.find(';') else {
            out.push('&');
            rest = &rest[1..];
            continue;
        };
        let entity = &rest[1..end];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                .and_then(char::from_u32),
        };
        match decoded {
            Some(ch) => {
                out.push(ch);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_nested_parameters() {
        let body = encode_call(
            "specs1.getRenderedSpecification",
            &[
                RpcValue::String("".to_string()),
                RpcValue::Array(vec![
                    RpcValue::String("A&B".to_string()),
                    RpcValue::Boolean(true),
                    RpcValue::Boolean(false),
                ]),
            ],
        );
        assert!(body.contains("<methodName>specs1.getRenderedSpecification</methodName>"));
        assert!(body.contains("<param><value><string></string></value></param>"));
        assert!(body.contains(
            "<array><data><value><string>A&amp;B</string></value><value><boolean>1</boolean></value><value><boolean>0</boolean></value></data></array>"
        ));
    }

    #[test]
    fn decodes_string_result() {
        let text = "<?xml version=\"1.0\"?><methodResponse><params><param><value><string>&lt;p&gt;hi &amp; bye&lt;/p&gt;</string></value></param></params></methodResponse>";
        assert_eq!(decode_response(text).unwrap(), "<p>hi & bye</p>");
    }

    #[test]
    fn decodes_untyped_result() {
        let text = "<methodResponse><params><param><value>plain&#33;</value></param></params></methodResponse>";
        assert_eq!(decode_response(text).unwrap(), "plain!");
    }

    #[test]
    fn decodes_fault() {
        let text = "<methodResponse><fault><value><struct>\
            <member><name>faultCode</name><value><int>4</int></value></member>\
            <member><name>faultString</name><value><string>No such page</string></value></member>\
            </struct></value></fault></methodResponse>";
        match decode_response(text) {
            Err(RemoteError::Fault { code, message }) => {
                assert_eq!(code, 4);
                assert_eq!(message, "No such page");
            }
            other => panic!("expected fault, got {other:?}"),
        }
    }

    #[test]
    fn fault_markup_inside_a_string_result_is_content() {
        let text = "<methodResponse><params><param><value><string><![CDATA[<p><fault>not a fault</fault></p>]]></string></value></param></params></methodResponse>";
        assert_eq!(
            decode_response(text).unwrap(),
            "<p><fault>not a fault</fault></p>"
        );
    }

    #[test]
    fn rejects_non_string_results() {
        let text = "<methodResponse><params><param><value><int>3</int></value></param></params></methodResponse>";
        assert!(matches!(
            decode_response(text),
            Err(RemoteError::Malformed(_))
        ));
        assert!(matches!(
            decode_response("<html>oops</html>"),
            Err(RemoteError::Malformed(_))
        ));
    }

    #[test]
    fn unescape_keeps_unknown_entities_and_cdata() {
        assert_eq!(unescape_xml("a &bogus; b"), "a &bogus; b");
        assert_eq!(unescape_xml("<![CDATA[<b>x</b>]]>"), "<b>x</b>");
        assert_eq!(unescape_xml("&#x41;&#66;"), "AB");
    }
}
