// # Zone-File Text Format
//
// Import parses RFC 1035 master-file text into record requests; export
// renders a zone's records back into that format.
//
// Supported on import:
//
// - `$ORIGIN` and `$TTL` directives
// - `@` for the current origin, relative and absolute owner names
// - a blank owner field repeating the previous owner
// - optional TTL and class (`IN` only) in either order
// - `;` comments and parenthesised continuation lines
// - quoted TXT character strings, concatenated, with `\X` and `\DDD`
//   escapes
//
// Every line is handled independently: a bad line is reported with its
// number and parsing carries on.

use serde::{Deserialize, Serialize};

use super::name;
use super::rdata::{RdataFields, RecordType};
use crate::error::{Error, Result};
use crate::model::record::DEFAULT_TTL;
use crate::model::{RecordSpec, ResourceRecord};

/// Content types accepted for import
pub const ACCEPTED_CONTENT_TYPES: [&str; 2] = ["text/plain", "text/dns"];

/// Reject content types that are not zone-file text
pub fn check_content_type(content_type: &str) -> Result<()> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if ACCEPTED_CONTENT_TYPES.contains(&essence.as_str()) {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "unsupported content type '{content_type}', expected one of {}",
            ACCEPTED_CONTENT_TYPES.join(", ")
        )))
    }
}

/// A problem on one line of an imported zone file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineError {
    pub line: usize,
    pub message: String,
}

/// Result of importing a zone file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub total_records_parsed: usize,
    pub records_added: usize,
    pub records_failed: usize,
    pub messages: Vec<LineError>,
}

/// A record line turned into a creation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRecord {
    pub line: usize,
    pub spec: RecordSpec,
}

#[derive(Debug, Default)]
pub struct ParsedZoneFile {
    pub records: Vec<ParsedRecord>,
    pub errors: Vec<LineError>,
    /// Lines that looked like records, parsed or not
    pub record_lines: usize,
}

/// Parse zone-file text for `zone_name`
pub fn parse(text: &str, zone_name: &str) -> ParsedZoneFile {
    let zone = name::normalize(zone_name);
    let mut parser = Parser {
        zone: zone.clone(),
        origin: zone,
        default_ttl: None,
        last_owner: None,
    };
    let mut out = ParsedZoneFile::default();

    for (line, content) in logical_lines(text) {
        let owner_inherited = content.starts_with([' ', '\t']);
        let tokens = match tokenize(&content) {
            Ok(tokens) => tokens,
            Err(message) => {
                out.errors.push(LineError { line, message });
                continue;
            }
        };
        let Some(first) = tokens.first() else {
            continue;
        };

        if !first.quoted && first.text.starts_with('$') {
            if let Err(message) = parser.directive(&tokens) {
                out.errors.push(LineError { line, message });
            }
            continue;
        }

        out.record_lines += 1;
        match parser.record(&tokens, owner_inherited) {
            Ok(spec) => out.records.push(ParsedRecord { line, spec }),
            Err(message) => out.errors.push(LineError { line, message }),
        }
    }
    out
}

/// Render records as zone-file text with absolute owner names
pub fn export(zone_name: &str, records: &[ResourceRecord]) -> String {
    let zone = name::normalize(zone_name);
    let mut out = format!("$ORIGIN {zone}.\n$TTL {DEFAULT_TTL}\n");
    for record in records {
        out.push_str(&format!(
            "{}. {} IN {} {}\n",
            record.qualified_name(&zone),
            record.ttl,
            record.record_type(),
            record.rdata.to_zone_text()
        ));
    }
    out
}

struct Parser {
    zone: String,
    origin: String,
    default_ttl: Option<u32>,
    last_owner: Option<String>,
}

impl Parser {
    fn directive(&mut self, tokens: &[Token]) -> std::result::Result<(), String> {
        let directive = tokens[0].text.to_ascii_uppercase();
        let arg = tokens
            .get(1)
            .map(|t| t.text.as_str())
            .ok_or_else(|| format!("{directive} requires an argument"))?;
        match directive.as_str() {
            "$ORIGIN" => {
                let origin = self.absolute(arg);
                name::validate_zone_name(&origin).map_err(|e| e.to_string())?;
                self.origin = origin;
                Ok(())
            }
            "$TTL" => {
                let ttl = arg
                    .parse::<u32>()
                    .map_err(|_| format!("invalid $TTL value '{arg}'"))?;
                self.default_ttl = Some(ttl);
                Ok(())
            }
            other => Err(format!("unsupported directive {other}")),
        }
    }

    fn record(&mut self, tokens: &[Token], owner_inherited: bool) -> std::result::Result<RecordSpec, String> {
        let mut rest = tokens;
        let owner = if owner_inherited {
            self.last_owner
                .clone()
                .ok_or_else(|| "record has no owner name and no previous owner".to_string())?
        } else {
            let (owner_token, tail) = rest.split_first().ok_or("empty record line")?;
            rest = tail;
            self.absolute(&owner_token.text)
        };
        self.last_owner = Some(owner.clone());

        let mut ttl = None;
        let mut record_type = None;
        while let Some((token, tail)) = rest.split_first() {
            rest = tail;
            let upper = token.text.to_ascii_uppercase();
            if ttl.is_none() && token.text.chars().all(|c| c.is_ascii_digit()) {
                ttl = Some(
                    token
                        .text
                        .parse::<u32>()
                        .map_err(|_| format!("invalid TTL '{}'", token.text))?,
                );
            } else if upper == "IN" {
                continue;
            } else if matches!(upper.as_str(), "CH" | "HS" | "CS") {
                return Err(format!("unsupported class {upper}"));
            } else {
                record_type = Some(upper);
                break;
            }
        }
        let type_text = record_type.ok_or("record is missing a type")?;
        let record_type = type_text
            .parse::<RecordType>()
            .map_err(|_| format!("unsupported record type {type_text}"))?;

        if !name::is_within_zone(&owner, &self.zone) {
            return Err(format!("owner {owner} is outside zone {}", self.zone));
        }

        let rdata = self.rdata(record_type, rest)?;
        let mut spec = RecordSpec::new(name::relativize(&owner, &self.zone), record_type, rdata);
        spec.ttl = ttl.or(self.default_ttl);
        if record_type == RecordType::Srv {
            let (service, protocol, base) = split_srv_owner(&spec.name)
                .ok_or_else(|| format!("SRV owner {owner} must start with _service._protocol"))?;
            spec.service = Some(service);
            spec.protocol = Some(protocol);
            spec.name = base;
        }
        Ok(spec)
    }

    fn rdata(&self, record_type: RecordType, tokens: &[Token]) -> std::result::Result<RdataFields, String> {
        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        let int = |raw: &str, field: &str| {
            raw.parse::<i64>()
                .map_err(|_| format!("{record_type} {field} must be an integer, got '{raw}'"))
        };
        let arity = |n: usize| {
            if texts.len() == n {
                Ok(())
            } else {
                Err(format!(
                    "{record_type} record expects {n} rdata field(s), got {}",
                    texts.len()
                ))
            }
        };
        match record_type {
            RecordType::A | RecordType::Aaaa => {
                arity(1)?;
                Ok(RdataFields::ip(texts[0]))
            }
            RecordType::Cname => {
                arity(1)?;
                Ok(RdataFields::cname(self.absolute(texts[0])))
            }
            RecordType::Ptr => {
                arity(1)?;
                Ok(RdataFields::ptr(self.absolute(texts[0])))
            }
            RecordType::Mx => {
                arity(2)?;
                Ok(RdataFields::mx(self.absolute(texts[1]), int(texts[0], "preference")?))
            }
            RecordType::Srv => {
                arity(4)?;
                let target = if texts[3] == "." {
                    ".".to_string()
                } else {
                    self.absolute(texts[3])
                };
                Ok(RdataFields::srv(
                    int(texts[0], "priority")?,
                    int(texts[1], "weight")?,
                    int(texts[2], "port")?,
                    target,
                ))
            }
            RecordType::Txt => {
                if tokens.is_empty() {
                    return Err("TXT record requires text".to_string());
                }
                Ok(RdataFields::txt(texts.concat()))
            }
        }
    }

    /// Resolve a name against the current origin
    fn absolute(&self, raw: &str) -> String {
        if raw == "@" {
            self.origin.clone()
        } else if raw.ends_with('.') {
            name::normalize(raw)
        } else {
            format!("{}.{}", raw.to_ascii_lowercase(), self.origin)
        }
    }
}

/// `_sip._tcp.host` -> (`_sip`, `_tcp`, `host`); apex owners become `@`
fn split_srv_owner(relative: &str) -> Option<(String, String, String)> {
    let mut labels = relative.splitn(3, '.');
    let service = labels.next().filter(|l| l.starts_with('_'))?;
    let protocol = labels.next().filter(|l| l.starts_with('_'))?;
    let base = labels.next().unwrap_or("@");
    Some((service.to_string(), protocol.to_string(), base.to_string()))
}

#[derive(Debug)]
struct Token {
    text: String,
    quoted: bool,
}

/// Join parenthesised continuations and strip comments, keeping the
/// starting line number of each logical line
fn logical_lines(text: &str) -> Vec<(usize, String)> {
    let mut lines = Vec::new();
    let mut pending: Option<(usize, String)> = None;
    let mut depth = 0usize;

    for (index, raw) in text.lines().enumerate() {
        let cleaned = strip_grouping(&strip_comment(raw), &mut depth);
        match pending.as_mut() {
            Some((_, buffer)) => {
                buffer.push(' ');
                buffer.push_str(cleaned.trim());
            }
            None => pending = Some((index + 1, cleaned.trim_end().to_string())),
        }
        if depth == 0 {
            if let Some((line, buffer)) = pending.take() {
                if !buffer.trim().is_empty() {
                    lines.push((line, buffer));
                }
            }
        }
    }
    if let Some((line, buffer)) = pending {
        if !buffer.trim().is_empty() {
            lines.push((line, buffer));
        }
    }
    lines
}

/// Blank out grouping parentheses outside quoted strings, tracking the
/// open-group depth across lines
fn strip_grouping(line: &str, depth: &mut usize) -> String {
    let mut out = String::with_capacity(line.len());
    let mut in_quotes = false;
    let mut escaped = false;
    for c in line.chars() {
        if escaped {
            escaped = false;
        } else {
            match c {
                '\\' => escaped = true,
                '"' => in_quotes = !in_quotes,
                '(' if !in_quotes => {
                    *depth += 1;
                    out.push(' ');
                    continue;
                }
                ')' if !in_quotes => {
                    *depth = depth.saturating_sub(1);
                    out.push(' ');
                    continue;
                }
                _ => {}
            }
        }
        out.push(c);
    }
    out
}

fn strip_comment(line: &str) -> String {
    let mut in_quotes = false;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => return line[..i].to_string(),
            _ => {}
        }
    }
    line.to_string()
}

fn tokenize(line: &str) -> std::result::Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '"' {
            chars.next();
            let mut bytes = Vec::new();
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '\\' => match chars.next() {
                        Some(d) if d.is_ascii_digit() => {
                            bytes.push(decimal_escape(d, &mut chars)?);
                        }
                        Some(escaped) => push_char(&mut bytes, escaped),
                        None => {}
                    },
                    '"' => {
                        closed = true;
                        break;
                    }
                    other => push_char(&mut bytes, other),
                }
            }
            if !closed {
                return Err("unterminated quoted string".to_string());
            }
            let text = String::from_utf8(bytes)
                .map_err(|_| "quoted string is not valid UTF-8".to_string())?;
            tokens.push(Token { text, quoted: true });
        } else {
            let mut text = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() || c == '"' {
                    break;
                }
                text.push(c);
                chars.next();
            }
            tokens.push(Token {
                text,
                quoted: false,
            });
        }
    }
    Ok(tokens)
}

fn push_char(bytes: &mut Vec<u8>, c: char) {
    bytes.extend_from_slice(c.encode_utf8(&mut [0; 4]).as_bytes());
}

/// Finish a `\DDD` escape whose first digit is `first`
fn decimal_escape(
    first: char,
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
) -> std::result::Result<u8, String> {
    let mut value = u32::from(first) - u32::from('0');
    for _ in 0..2 {
        let digit = chars
            .next_if(char::is_ascii_digit)
            .ok_or("escape \\DDD needs three decimal digits")?;
        value = value * 10 + (u32::from(digit) - u32::from('0'));
    }
    u8::try_from(value).map_err(|_| format!("escape \\{value} is out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ZONE: &str = "\
$ORIGIN example.com.
$TTL 3600
; apex and hosts
@           IN  A     10.0.0.1
www    300  IN  A     10.0.0.2
            IN  AAAA  2001:db8::2
mail        IN  MX    10 mx1
_sip._udp   IN  SRV   1 2 5060 sip.example.com.
txt         IN  TXT   \"v=spf1\" \" -all\" ; trailing comment
alias       IN  CNAME www
@           IN  SOA   ns1 hostmaster 1 2 3 4 5
bad         IN  A     not-an-ip
";

    #[test]
    fn parses_supported_lines_and_reports_the_rest() {
        let parsed = parse(ZONE, "example.com");
        assert_eq!(parsed.record_lines, 9);
        assert_eq!(parsed.records.len(), 8);
        assert_eq!(parsed.errors.len(), 1);
        assert_eq!(parsed.errors[0].line, 11);
        assert!(parsed.errors[0].message.contains("SOA"));

        let apex = &parsed.records[0].spec;
        assert_eq!(apex.name, "@");
        assert_eq!(apex.ttl, Some(3600));

        let aaaa = &parsed.records[2].spec;
        assert_eq!(aaaa.name, "www");
        assert_eq!(aaaa.record_type, RecordType::Aaaa);

        let mx = &parsed.records[3].spec;
        assert_eq!(mx.rdata.exchange.as_deref(), Some("mx1.example.com"));

        let srv = &parsed.records[4].spec;
        assert_eq!(srv.service.as_deref(), Some("_sip"));
        assert_eq!(srv.protocol.as_deref(), Some("_udp"));
        assert_eq!(srv.name, "@");

        let txt = &parsed.records[5].spec;
        assert_eq!(txt.rdata.text.as_deref(), Some("v=spf1 -all"));
    }

    #[test]
    fn multi_line_records_are_joined() {
        let text = "$ORIGIN example.com.\n_http._tcp.svc IN SRV (\n  1 2\n  80 web ) ; split\nafter IN A 10.0.0.9\n";
        let parsed = parse(text, "example.com");
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        assert_eq!(parsed.record_lines, 2);
        let srv = &parsed.records[0];
        assert_eq!(srv.line, 2);
        assert_eq!(srv.spec.name, "svc");
        assert_eq!(srv.spec.rdata.port, Some(80));
        assert_eq!(srv.spec.rdata.target.as_deref(), Some("web.example.com"));
        assert_eq!(parsed.records[1].line, 5);
    }

    #[test]
    fn quoted_text_keeps_parentheses_and_semicolons() {
        let parsed = parse("t IN TXT \"v=1 (note)\" \"; not a comment\"\n", "example.com");
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        assert_eq!(
            parsed.records[0].spec.rdata.text.as_deref(),
            Some("v=1 (note); not a comment")
        );
    }

    #[test]
    fn decimal_escapes_decode_to_bytes() {
        let parsed = parse("t IN TXT \"a\\010b\\\"c\\195\\169\"\n", "example.com");
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        assert_eq!(parsed.records[0].spec.rdata.text.as_deref(), Some("a\nb\"c\u{e9}"));

        let parsed = parse("t IN TXT \"\\300\"\nu IN TXT \"\\01\"\n", "example.com");
        assert_eq!(parsed.errors.len(), 2);
        assert!(parsed.errors[0].message.contains("out of range"));
    }

    #[test]
    fn names_outside_zone_are_rejected() {
        let parsed = parse("host.other.org. IN A 10.0.0.1\n", "example.com");
        assert_eq!(parsed.errors.len(), 1);
    }

    #[test]
    fn content_type_hint() {
        assert!(check_content_type("text/plain; charset=utf-8").is_ok());
        assert!(check_content_type("text/dns").is_ok());
        assert!(check_content_type("application/json").is_err());
    }
}
