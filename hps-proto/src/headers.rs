//! HTTP headers as carried by the headers characteristic: `name=value`
//! lines separated by `\n`, capped to a maximum number of octets.

use tracing::warn;

/// Serialize headers into at most `max_octets` bytes.
///
/// Returns the buffer and whether it was truncated to fit.
pub fn encode<I, K, V>(headers: I, max_octets: usize) -> (Vec<u8>, bool)
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut buf = Vec::new();
    for (name, value) in headers {
        if !buf.is_empty() {
            buf.push(b'\n');
        }
        buf.extend_from_slice(name.as_ref().as_bytes());
        buf.push(b'=');
        buf.extend_from_slice(value.as_ref().as_bytes());
    }
    truncate(buf, max_octets)
}

/// Hard cap `data` at `max_octets`, reporting whether anything was cut.
pub fn truncate(mut data: Vec<u8>, max_octets: usize) -> (Vec<u8>, bool) {
    if data.len() > max_octets {
        data.truncate(max_octets);
        (data, true)
    } else {
        (data, false)
    }
}

/// Parse a headers buffer back into ordered pairs.
///
/// Lines that do not hold exactly one `=` are dropped with a warning, empty
/// lines are skipped.
pub fn decode(data: &[u8]) -> Vec<(String, String)> {
    String::from_utf8_lossy(data)
        .split('\n')
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let pair = parse_line(line);
            if pair.is_none() {
                warn!(line, "ignoring invalid header");
            }
            pair
        })
        .collect()
}

fn parse_line(line: &str) -> Option<(String, String)> {
    let (name, value) = line.split_once('=')?;
    if value.contains('=') {
        return None;
    }
    Some((name.to_string(), value.to_string()))
}
