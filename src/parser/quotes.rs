use indexmap::IndexMap;

/// Quote characters recognized by default: string literals and quoted identifiers.
pub const DEFAULT_QUOTES: &[char] = &['\'', '"'];

const TOKEN_PREFIX: &str = "quote_";

/// A quoted span of the source script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteSpan {
    /// Byte offset of the opening quote.
    pub start: usize,
    /// Byte offset one past the closing quote.
    pub end: usize,
    pub quote: char,
    /// Text between the quotes, escapes kept verbatim.
    pub content: String,
}

/// A script whose top-level quoted spans were swapped for tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedScript {
    /// The script with every span replaced by `{<prefix><n>}`.
    pub text: String,
    pub spans: Vec<QuoteSpan>,
    /// Token -> original quoted text including its delimiters.
    pub quotes: IndexMap<String, String>,
    pub prefix: String,
}

impl ScannedScript {
    /// Puts the quoted spans back into the scanned text.
    #[must_use]
    pub fn restore(&self) -> String {
        self.restore_into(&self.text)
    }

    /// Puts the quoted spans back into a rewritten version of the text.
    /// Tokens missing from `text` are skipped.
    #[must_use]
    pub fn restore_into(&self, text: &str) -> String {
        restore_tokens(text, &self.quotes)
    }

    /// Name of the token (without braces) found at the start of `text`, if any.
    #[must_use]
    pub fn token_at<'a>(&self, text: &'a str) -> Option<&'a str> {
        let rest = text.strip_prefix('{')?;
        let close = rest.find('}')?;
        let name = &rest[..close];
        let digits = name.strip_prefix(self.prefix.as_str())?;
        (!digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())).then_some(name)
    }
}

/// Wraps a token name in the braces used inside scanned text.
#[must_use]
pub fn token_marker(name: &str) -> String {
    format!("{{{name}}}")
}

/// Replaces each `{token}` in `text` with its original quoted text.
#[must_use]
pub fn restore_tokens(text: &str, quotes: &IndexMap<String, String>) -> String {
    let mut out = text.to_string();
    for (token, original) in quotes {
        out = out.replace(&token_marker(token), original);
    }
    out
}

/// Picks a token prefix that does not already occur in the script.
fn unique_prefix(script: &str) -> String {
    let mut prefix = TOKEN_PREFIX.to_string();
    while script.contains(&prefix) {
        prefix.push('_');
    }
    prefix
}

/// Splits a script into quoted spans and residual text.
///
/// Single left-to-right pass. A backslash toggles the escape flag, and an
/// escaped quote character never opens or closes a span. A span is closed
/// only by the character that opened it, so `"` inside `'...'` is content.
/// An unterminated quote at the end is left in place as plain text.
#[must_use]
pub fn scan_quotes(script: &str, quote_chars: &[char]) -> ScannedScript {
    let prefix = unique_prefix(script);
    let mut text = String::with_capacity(script.len());
    let mut spans = Vec::new();
    let mut quotes = IndexMap::new();

    // (opening char, byte offset, content so far)
    let mut open: Option<(char, usize, String)> = None;
    let mut escaped = false;

    for (offset, c) in script.char_indices() {
        let is_delimiter = !escaped
            && match &open {
                Some((q, _, _)) => c == *q,
                None => quote_chars.contains(&c),
            };

        if is_delimiter {
            match open.take() {
                Some((q, start, content)) => {
                    let token = format!("{prefix}{}", spans.len() + 1);
                    quotes.insert(token.clone(), format!("{q}{content}{q}"));
                    text.push_str(&token_marker(&token));
                    spans.push(QuoteSpan {
                        start,
                        end: offset + c.len_utf8(),
                        quote: q,
                        content,
                    });
                }
                None => open = Some((c, offset, String::new())),
            }
        } else {
            match &mut open {
                Some((_, _, content)) => content.push(c),
                None => text.push(c),
            }
        }

        escaped = c == '\\' && !escaped;
    }

    if let Some((q, _, content)) = open {
        text.push(q);
        text.push_str(&content);
    }

    ScannedScript {
        text,
        spans,
        quotes,
        prefix,
    }
}
