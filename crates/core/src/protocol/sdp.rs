//! SDP (Session Description Protocol) parsing (RFC 4566 / RFC 8866).
//!
//! Parses the SDP body of a DESCRIBE response. The format is line
//! structured, `<key>=<value>` with single-character keys:
//!
//! ```text
//! v=0                                  ← protocol version (required)
//! o=- 0 0 IN IP4 0.0.0.0              ← originator (required)
//! s=Cam                                ← session name (required)
//! i= u= e= p= c= b= t= r= z= k= a=    ← optional session-level lines
//! m=video 0 RTP/AVP 26                 ← media description
//! a=control:trackID=1                  ← media-level attributes
//! a=cliprect:0,0,960,1280
//! a=framerate:10
//! ```
//!
//! Only the keys listed above are recognized; unknown keys are skipped.
//! Attributes are kept as an ordered list of `(name, value)` pairs —
//! order is observable, lookups return the first match.

use crate::error::{GatewayError, ParseErrorKind, Result};

/// A parsed session description (RFC 4566 §5).
#[derive(Debug, Clone, Default)]
pub struct SessionDescription {
    /// `v=` protocol version (always 0 in practice).
    pub version: u32,
    /// `o=` originator and session identifier line, verbatim.
    pub originator: String,
    /// `s=` session name.
    pub name: String,
    /// `i=` session information.
    pub info: Option<String>,
    /// `u=` URI of the description.
    pub uri: Option<String>,
    /// `e=` contact e-mail addresses.
    pub emails: Vec<String>,
    /// `p=` contact phone numbers.
    pub phones: Vec<String>,
    /// `c=` connection data.
    pub connection: Option<String>,
    /// `b=` bandwidth lines.
    pub bandwidths: Vec<String>,
    /// `t=` (+ optional `r=`) timing blocks.
    pub times: Vec<TimeDescription>,
    /// `z=` time zone adjustments.
    pub zone: Option<String>,
    /// `k=` encryption key.
    pub key: Option<String>,
    /// Session-level `a=` attributes, in order of appearance.
    pub attributes: Vec<(String, String)>,
    /// `m=` media blocks with their nested lines.
    pub media: Vec<MediaDescription>,
}

/// `t=` timing with its optional `r=` repeat line (RFC 4566 §5.9/§5.10).
#[derive(Debug, Clone, Default)]
pub struct TimeDescription {
    pub active: String,
    pub repeat: Option<String>,
}

/// One `m=` block and its nested lines (RFC 4566 §5.14).
#[derive(Debug, Clone, Default)]
pub struct MediaDescription {
    /// The `m=` line value, e.g. `video 0 RTP/AVP 26`.
    pub name: String,
    pub info: Option<String>,
    pub connection: Option<String>,
    pub bandwidths: Vec<String>,
    pub key: Option<String>,
    /// Media-level `a=` attributes, in order of appearance.
    pub attributes: Vec<(String, String)>,
}

impl SessionDescription {
    /// Parse an SDP body.
    ///
    /// `v=`, `o=` and `s=` must open the description in that order
    /// (RFC 4566 §5); everything after them is matched by key, with
    /// unknown keys skipped.
    pub fn parse(body: &str) -> Result<Self> {
        let mut lines = body
            .lines()
            .map(|l| l.trim_end_matches('\r'))
            .filter(|l| !l.is_empty())
            .map(split_key)
            .peekable();

        let mut sdp = SessionDescription {
            version: require(&mut lines, 'v')?
                .trim()
                .parse()
                .map_err(|_| invalid("v= is not a number"))?,
            originator: require(&mut lines, 'o')?.to_string(),
            name: require(&mut lines, 's')?.to_string(),
            ..Default::default()
        };

        // Session-level lines, until the first m= block.
        while let Some(&(key, value)) = lines.peek() {
            if key == Some('m') {
                break;
            }
            lines.next();
            let Some(key) = key else { continue };
            let value = value.to_string();
            match key {
                'i' => sdp.info.get_or_insert(value),
                'u' => sdp.uri.get_or_insert(value),
                'e' => {
                    sdp.emails.push(value);
                    continue;
                }
                'p' => {
                    sdp.phones.push(value);
                    continue;
                }
                'c' => sdp.connection.get_or_insert(value),
                'b' => {
                    sdp.bandwidths.push(value);
                    continue;
                }
                't' => {
                    sdp.times.push(TimeDescription {
                        active: value,
                        repeat: None,
                    });
                    continue;
                }
                'r' => {
                    if let Some(time) = sdp.times.last_mut() {
                        time.repeat = Some(value);
                    }
                    continue;
                }
                'z' => sdp.zone.get_or_insert(value),
                'k' => sdp.key.get_or_insert(value),
                'a' => {
                    sdp.attributes.push(split_attribute(&value));
                    continue;
                }
                _ => continue, // unknown key: skip
            };
        }

        // Media blocks: each m= opens a block that runs to the next m=.
        while let Some((Some('m'), name)) = lines.peek().copied() {
            lines.next();
            let mut media = MediaDescription {
                name: name.to_string(),
                ..Default::default()
            };

            while let Some(&(key, value)) = lines.peek() {
                if key == Some('m') {
                    break;
                }
                lines.next();
                let Some(key) = key else { continue };
                let value = value.to_string();
                match key {
                    'i' => media.info.get_or_insert(value),
                    'c' => media.connection.get_or_insert(value),
                    'b' => {
                        media.bandwidths.push(value);
                        continue;
                    }
                    'k' => media.key.get_or_insert(value),
                    'a' => {
                        media.attributes.push(split_attribute(&value));
                        continue;
                    }
                    _ => continue, // unknown key: skip
                };
            }

            sdp.media.push(media);
        }

        Ok(sdp)
    }

    /// First media block whose `m=` line mentions `video`.
    pub fn video(&self) -> Option<&MediaDescription> {
        self.media.iter().find(|m| m.name.contains("video"))
    }
}

impl MediaDescription {
    /// First attribute with the given name.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Frame dimensions from the `cliprect` attribute.
    ///
    /// Format is `x1,y1,x2,y2`; the width is the token after the last
    /// comma and the height the one before it (`0,0,960,1280` → 1280×960).
    pub fn clip_rect(&self) -> Option<(u32, u32)> {
        let raw = self.attribute("cliprect")?;
        let mut tokens = raw.rsplit(',');
        let width = tokens.next()?.trim().parse().ok()?;
        let height = tokens.next()?.trim().parse().ok()?;
        Some((width, height))
    }

    /// Frames per second from the `framerate` attribute.
    pub fn framerate(&self) -> Option<f32> {
        self.attribute("framerate")?.trim().parse().ok()
    }

    /// Track sub-path from the `control` attribute.
    pub fn control(&self) -> Option<&str> {
        self.attribute("control")
    }
}

fn invalid(detail: &str) -> GatewayError {
    GatewayError::parse(ParseErrorKind::InvalidSdp(detail.to_string()))
}

/// Split `k=value` into its key character and value; `None` key for lines
/// that do not follow the `<char>=` shape.
fn split_key(line: &str) -> (Option<char>, &str) {
    let mut chars = line.chars();
    match (chars.next(), chars.next()) {
        (Some(key), Some('=')) => (Some(key), &line[2..]),
        _ => (None, line),
    }
}

/// `a=name:value` splits at the first colon; a flag attribute like
/// `a=sendonly` is stored with an empty value.
fn split_attribute(raw: &str) -> (String, String) {
    match raw.split_once(':') {
        Some((name, value)) => (name.to_string(), value.to_string()),
        None => (raw.to_string(), String::new()),
    }
}

fn require<'a, I>(lines: &mut std::iter::Peekable<I>, key: char) -> Result<&'a str>
where
    I: Iterator<Item = (Option<char>, &'a str)>,
{
    match lines.peek() {
        Some(&(k, value)) if k == Some(key) => {
            lines.next();
            Ok(value)
        }
        _ => Err(invalid(&format!("missing required {key}= line"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAMERA_SDP: &str = "v=0\r\n\
                              o=- 0 0 IN IP4 0.0.0.0\r\n\
                              s=Cam\r\n\
                              m=video 0 RTP/AVP 26\r\n\
                              a=control:trackID=1\r\n\
                              a=cliprect:0,0,960,1280\r\n\
                              a=framerate:10\r\n";

    #[test]
    fn parses_camera_description() {
        let sdp = SessionDescription::parse(CAMERA_SDP).unwrap();
        assert_eq!(sdp.version, 0);
        assert_eq!(sdp.originator, "- 0 0 IN IP4 0.0.0.0");
        assert_eq!(sdp.name, "Cam");

        let video = sdp.video().expect("video media block");
        assert_eq!(video.name, "video 0 RTP/AVP 26");
        assert_eq!(video.clip_rect(), Some((1280, 960)));
        assert_eq!(video.framerate(), Some(10.0));
        assert_eq!(video.control(), Some("trackID=1"));
    }

    #[test]
    fn parses_full_session_level() {
        let body = "v=0\r\n\
                    o=alice 123 456 IN IP4 10.0.0.1\r\n\
                    s=Session\r\n\
                    i=A session\r\n\
                    u=http://example.com\r\n\
                    e=alice@example.com\r\n\
                    e=bob@example.com\r\n\
                    p=+1 555 0100\r\n\
                    c=IN IP4 224.2.17.12\r\n\
                    b=AS:128\r\n\
                    t=0 0\r\n\
                    r=604800 3600 0 90000\r\n\
                    z=2882844526 -1h\r\n\
                    k=clear:password\r\n\
                    a=recvonly\r\n\
                    a=tool:cam\r\n\
                    m=video 0 RTP/AVP 26\r\n\
                    i=Main camera\r\n\
                    c=IN IP4 224.2.17.13\r\n\
                    b=AS:256\r\n\
                    a=framerate:25\r\n";
        let sdp = SessionDescription::parse(body).unwrap();
        assert_eq!(sdp.info.as_deref(), Some("A session"));
        assert_eq!(sdp.uri.as_deref(), Some("http://example.com"));
        assert_eq!(sdp.emails.len(), 2);
        assert_eq!(sdp.phones.len(), 1);
        assert_eq!(sdp.connection.as_deref(), Some("IN IP4 224.2.17.12"));
        assert_eq!(sdp.bandwidths, vec!["AS:128"]);
        assert_eq!(sdp.times.len(), 1);
        assert_eq!(sdp.times[0].active, "0 0");
        assert!(sdp.times[0].repeat.is_some());
        assert_eq!(sdp.zone.as_deref(), Some("2882844526 -1h"));
        assert_eq!(sdp.key.as_deref(), Some("clear:password"));
        assert_eq!(
            sdp.attributes,
            vec![
                ("recvonly".to_string(), String::new()),
                ("tool".to_string(), "cam".to_string()),
            ]
        );

        let video = &sdp.media[0];
        assert_eq!(video.info.as_deref(), Some("Main camera"));
        assert_eq!(video.connection.as_deref(), Some("IN IP4 224.2.17.13"));
        assert_eq!(video.bandwidths, vec!["AS:256"]);
        assert_eq!(video.framerate(), Some(25.0));
    }

    #[test]
    fn missing_required_key_is_error() {
        assert!(SessionDescription::parse("o=- 0 0\r\ns=X\r\n").is_err());
        assert!(SessionDescription::parse("v=0\r\ns=X\r\n").is_err());
    }

    #[test]
    fn unknown_keys_are_skipped() {
        let body = "v=0\r\no=- 0 0\r\ns=X\r\nx=strange\r\nm=video 0 RTP/AVP 26\r\n\
                    y=also strange\r\na=framerate:30\r\n";
        let sdp = SessionDescription::parse(body).unwrap();
        let video = sdp.video().unwrap();
        assert_eq!(video.framerate(), Some(30.0));
    }

    #[test]
    fn attribute_lookup_is_first_match() {
        let body = "v=0\r\no=- 0 0\r\ns=X\r\nm=video 0 RTP/AVP 26\r\n\
                    a=control:first\r\na=control:second\r\n";
        let sdp = SessionDescription::parse(body).unwrap();
        assert_eq!(sdp.video().unwrap().control(), Some("first"));
    }

    #[test]
    fn multiple_media_blocks() {
        let body = "v=0\r\no=- 0 0\r\ns=X\r\n\
                    m=audio 0 RTP/AVP 0\r\na=control:trackID=0\r\n\
                    m=video 0 RTP/AVP 26\r\na=control:trackID=1\r\n";
        let sdp = SessionDescription::parse(body).unwrap();
        assert_eq!(sdp.media.len(), 2);
        assert_eq!(sdp.video().unwrap().control(), Some("trackID=1"));
    }
}
