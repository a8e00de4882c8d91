//! Lenient tag-soup tokenizer. It never aborts on malformed input; when it
//! genuinely cannot make sense of the remaining bytes it records a terminal
//! error and reports end of input, so the caller can serialize whatever tree
//! was built up to that point.
use crate::errors::Error;
use lazy_static::lazy_static;
use regex::{Captures, Regex};

/// Token types emitted by the tokenizer.
#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    StartTag {
        name: String,
        attributes: Vec<(String, String)>,
        is_self_closing: bool,
    },
    EndTag {
        name: String,
    },
    Text {
        value: String,
    },
    Comment {
        value: String,
    },
    Eof,
}

impl Token {
    pub fn is_eof(&self) -> bool {
        matches!(self, Token::Eof)
    }
}

lazy_static! {
    static ref START_TAG: Regex = Regex::new(
        r#"^<([A-Za-z][-A-Za-z0-9:.]*)((?:\s+[A-Za-z_:][-A-Za-z0-9_:.]*(?:\s*=\s*(?:"[^"]*"|'[^']*'|[^>\s]+))?)*)\s*(/?)>"#
    )
    .expect("valid regex");
    static ref END_TAG: Regex =
        Regex::new(r"^</([A-Za-z][-A-Za-z0-9:.]*)\s*>").expect("valid regex");
    static ref ATTRIBUTE: Regex = Regex::new(
        r#"([A-Za-z_:][-A-Za-z0-9_:.]*)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^>\s]+)))?"#
    )
    .expect("valid regex");
    static ref ENTITY: Regex =
        Regex::new(r"&(?:#[xX]([0-9A-Fa-f]+)|#([0-9]+)|([A-Za-z][A-Za-z0-9]*));")
            .expect("valid regex");
}

/// HTML4-style empty elements. These close themselves even without an XHTML
/// `/>`, so `<br>` never swallows following content.
const EMPTY_ELEMENTS: &[&str] = &[
    "area", "base", "basefont", "br", "col", "embed", "frame", "hr", "img", "input", "isindex",
    "link", "meta", "param",
];

/// Elements whose content is raw text up to the matching end tag.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

/// Boolean attributes that take their own name as value when written bare.
const FILL_ATTRIBUTES: &[&str] = &[
    "checked", "compact", "declare", "defer", "disabled", "ismap", "multiple", "nohref",
    "noresize", "noshade", "nowrap", "readonly", "selected",
];

pub struct Tokenizer<'input> {
    input: &'input str,
    position: usize,
    /// Tokens already produced but not yet handed out (raw text content and
    /// the synthesized end tag after a `<script>`/`<style>` start tag).
    queue: Vec<Token>,
    error: Option<Error>,
}

impl<'input> Tokenizer<'input> {
    pub fn new(input: &'input str) -> Self {
        Self {
            input,
            position: 0,
            queue: vec![],
            error: None,
        }
    }

    /// The terminal error, if tokenization failed partway through.
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Produces the next token. Returns [`Token::Eof`] at end of input and
    /// forever after a terminal error.
    pub fn next_token(&mut self) -> Token {
        if !self.queue.is_empty() {
            return self.queue.remove(0);
        }
        if self.error.is_some() {
            return Token::Eof;
        }

        let rest = &self.input[self.position..];
        if rest.is_empty() {
            return Token::Eof;
        }

        if let Some(after) = rest.strip_prefix("<!--") {
            return match after.find("-->") {
                Some(idx) => {
                    self.position += 4 + idx + 3;
                    Token::Comment {
                        value: after[..idx].to_string(),
                    }
                }
                // Unterminated comment: treat the remainder as comment text.
                None => {
                    self.position = self.input.len();
                    Token::Comment {
                        value: after.to_string(),
                    }
                }
            };
        }

        // Doctypes, CDATA markers and processing instructions are skipped.
        if rest.starts_with("<!") || rest.starts_with("<?") {
            return match rest.find('>') {
                Some(idx) => {
                    self.position += idx + 1;
                    Token::Comment {
                        value: rest[2..idx].to_string(),
                    }
                }
                None => {
                    self.position = self.input.len();
                    Token::Comment {
                        value: rest[2..].to_string(),
                    }
                }
            };
        }

        if rest.starts_with("</") {
            let Some(caps) = END_TAG.captures(rest) else {
                return self.fail(Error::UnterminatedTag(self.position));
            };
            self.position += caps[0].len();
            return Token::EndTag {
                name: caps[1].to_lowercase(),
            };
        }

        if rest.starts_with('<') {
            let Some(caps) = START_TAG.captures(rest) else {
                return self.fail(Error::UnterminatedTag(self.position));
            };
            self.position += caps[0].len();

            let name = caps[1].to_lowercase();
            let attributes = parse_attributes(&caps[2]);
            let is_self_closing = !caps[3].is_empty() || EMPTY_ELEMENTS.contains(&name.as_str());

            if !is_self_closing && RAW_TEXT_ELEMENTS.contains(&name.as_str()) {
                if let Err(err) = self.consume_raw_text(&name) {
                    return self.fail(err);
                }
            }

            return Token::StartTag {
                name,
                attributes,
                is_self_closing,
            };
        }

        // Character data up to the next tag opener.
        let end = rest.find('<').unwrap_or(rest.len());
        self.position += end;
        Token::Text {
            value: decode_entities(&rest[..end]),
        }
    }

    /// Consumes everything up to the matching end tag of a raw text element
    /// and queues it as a text token followed by the end tag.
    fn consume_raw_text(&mut self, name: &str) -> Result<(), Error> {
        let rest = &self.input[self.position..];
        let needle = format!("</{name}");
        // ASCII fold only: tag names are ASCII and Unicode lowercasing can
        // change byte lengths, which would skew the offsets into `rest`.
        let Some(idx) = rest.to_ascii_lowercase().find(&needle) else {
            return Err(Error::UnclosedRawText(name.to_string()));
        };
        let Some(close) = rest[idx..].find('>') else {
            return Err(Error::UnclosedRawText(name.to_string()));
        };

        // Unwrap the comment/CDATA shells scripts are traditionally hidden in.
        let content = rest[..idx]
            .replace("<!--", "")
            .replace("-->", "")
            .replace("<![CDATA[", "")
            .replace("]]>", "");

        self.queue.push(Token::Text { value: content });
        self.queue.push(Token::EndTag {
            name: name.to_string(),
        });
        self.position += idx + close + 1;
        Ok(())
    }

    fn fail(&mut self, error: Error) -> Token {
        self.error = Some(error);
        self.queue.clear();
        Token::Eof
    }
}

fn parse_attributes(raw: &str) -> Vec<(String, String)> {
    let mut attributes = vec![];
    for caps in ATTRIBUTE.captures_iter(raw) {
        let name = caps[1].to_lowercase();
        let value = caps
            .get(2)
            .or_else(|| caps.get(3))
            .or_else(|| caps.get(4))
            .map(|m| decode_entities(m.as_str()))
            .unwrap_or_else(|| {
                if FILL_ATTRIBUTES.contains(&name.as_str()) {
                    name.clone()
                } else {
                    String::new()
                }
            });
        attributes.push((name, value));
    }
    attributes
}

/// Decodes the named entities the purifier understands plus numeric
/// references. Unknown entities are left verbatim.
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    ENTITY
        .replace_all(text, |caps: &Captures| {
            if let Some(hex) = caps.get(1) {
                return u32::from_str_radix(hex.as_str(), 16)
                    .ok()
                    .and_then(char::from_u32)
                    .map(String::from)
                    .unwrap_or_else(|| caps[0].to_string());
            }
            if let Some(dec) = caps.get(2) {
                return dec
                    .as_str()
                    .parse::<u32>()
                    .ok()
                    .and_then(char::from_u32)
                    .map(String::from)
                    .unwrap_or_else(|| caps[0].to_string());
            }
            match &caps[3] {
                "amp" => "&".to_string(),
                "lt" => "<".to_string(),
                "gt" => ">".to_string(),
                "quot" => "\"".to_string(),
                "apos" => "'".to_string(),
                "nbsp" => "\u{a0}".to_string(),
                _ => caps[0].to_string(),
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn collect(input: &str) -> Vec<Token> {
        let mut tokenizer = Tokenizer::new(input);
        let mut tokens = vec![];
        loop {
            let token = tokenizer.next_token();
            if token.is_eof() {
                return tokens;
            }
            tokens.push(token);
        }
    }

    #[test]
    fn start_tag_with_attributes() {
        let tokens = collect(r#"<a href="/x" title='hi' rel=next>"#);
        assert_eq!(
            tokens,
            vec![Token::StartTag {
                name: "a".into(),
                attributes: vec![
                    ("href".into(), "/x".into()),
                    ("title".into(), "hi".into()),
                    ("rel".into(), "next".into()),
                ],
                is_self_closing: false,
            }]
        );
    }

    #[test]
    fn uppercase_names_are_lowered() {
        let tokens = collect("<P CLASS=intro>x</P>");
        assert_eq!(
            tokens,
            vec![
                Token::StartTag {
                    name: "p".into(),
                    attributes: vec![("class".into(), "intro".into())],
                    is_self_closing: false,
                },
                Token::Text { value: "x".into() },
                Token::EndTag { name: "p".into() },
            ]
        );
    }

    #[test_case("<br>"; "bare")]
    #[test_case("<br/>"; "xhtml")]
    #[test_case("<br />"; "xhtml spaced")]
    fn br_is_always_self_closing(input: &str) {
        assert_eq!(
            collect(input),
            vec![Token::StartTag {
                name: "br".into(),
                attributes: vec![],
                is_self_closing: true,
            }]
        );
    }

    #[test]
    fn namespaced_word_tags() {
        let tokens = collect("<o:p>x</o:p>");
        assert_eq!(
            tokens,
            vec![
                Token::StartTag {
                    name: "o:p".into(),
                    attributes: vec![],
                    is_self_closing: false,
                },
                Token::Text { value: "x".into() },
                Token::EndTag { name: "o:p".into() },
            ]
        );
    }

    #[test]
    fn comments_and_doctype() {
        let tokens = collect("<!DOCTYPE html><!-- note -->x");
        assert_eq!(
            tokens,
            vec![
                Token::Comment {
                    value: "DOCTYPE html".into()
                },
                Token::Comment {
                    value: " note ".into()
                },
                Token::Text { value: "x".into() },
            ]
        );
    }

    #[test]
    fn script_content_is_raw_text() {
        let tokens = collect("<script>if (a < b) { go(); }</script>after");
        assert_eq!(
            tokens,
            vec![
                Token::StartTag {
                    name: "script".into(),
                    attributes: vec![],
                    is_self_closing: false,
                },
                Token::Text {
                    value: "if (a < b) { go(); }".into()
                },
                Token::EndTag {
                    name: "script".into()
                },
                Token::Text {
                    value: "after".into()
                },
            ]
        );
    }

    #[test]
    fn raw_text_offsets_survive_non_ascii_content() {
        // "İ" grows from 2 to 3 bytes under Unicode lowercasing, so a
        // non-length-preserving fold would misplace the end tag.
        let input = format!("<SCRIPT>{}</SCRIPT>éafter", "İ".repeat(10));
        let tokens = collect(&input);
        assert_eq!(
            tokens,
            vec![
                Token::StartTag {
                    name: "script".into(),
                    attributes: vec![],
                    is_self_closing: false,
                },
                Token::Text {
                    value: "İ".repeat(10),
                },
                Token::EndTag {
                    name: "script".into()
                },
                Token::Text {
                    value: "éafter".into()
                },
            ]
        );
    }

    #[test]
    fn unclosed_script_is_terminal() {
        let mut tokenizer = Tokenizer::new("<script>var x = 1;");
        assert!(tokenizer.next_token().is_eof());
        assert_eq!(
            tokenizer.error(),
            Some(&Error::UnclosedRawText("script".into()))
        );
    }

    #[test]
    fn unterminated_tag_is_terminal() {
        let mut tokenizer = Tokenizer::new("before<a href=\"x");
        assert_eq!(
            tokenizer.next_token(),
            Token::Text {
                value: "before".into()
            }
        );
        assert!(tokenizer.next_token().is_eof());
        assert_eq!(tokenizer.error(), Some(&Error::UnterminatedTag(6)));
        // Terminal means terminal.
        assert!(tokenizer.next_token().is_eof());
    }

    #[test_case("&amp;", "&")]
    #[test_case("&lt;b&gt;", "<b>")]
    #[test_case("&quot;q&quot;", "\"q\"")]
    #[test_case("&#65;", "A")]
    #[test_case("&#x41;", "A")]
    #[test_case("&nbsp;", "\u{a0}")]
    #[test_case("&bogus;", "&bogus;"; "unknown entity is preserved")]
    #[test_case("a & b", "a & b"; "bare ampersand")]
    fn entities(input: &str, expected: &str) {
        assert_eq!(decode_entities(input), expected);
    }

    #[test]
    fn fill_attributes_take_their_name() {
        let tokens = collect("<input disabled>");
        assert_eq!(
            tokens,
            vec![Token::StartTag {
                name: "input".into(),
                attributes: vec![("disabled".into(), "disabled".into())],
                is_self_closing: true,
            }]
        );
    }
}
