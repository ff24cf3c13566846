//! First-match RFC-822 address extraction from free-form text.

/// Extract the first syntactically valid address from a raw email field.
///
/// The field may carry a display name, comments, several addresses or plain
/// garbage. Quoted local parts, angle-bracket routes and bracketed domain
/// literals are all accepted; the returned token is `local@domain` with the
/// local part kept verbatim (quotes included when the source was quoted).
pub fn extract_email(raw: &str) -> Option<String> {
    let bytes = raw.as_bytes();
    for start in 0..bytes.len() {
        if !could_start_address(bytes[start]) {
            continue;
        }
        let mut scanner = Scanner::new(raw, start);
        let parsed = if bytes[start] == b'<' {
            scanner.parse_route_addr()
        } else {
            scanner.parse_addr_spec()
        };
        if let Some(address) = parsed {
            return Some(address);
        }
    }
    None
}

fn could_start_address(b: u8) -> bool {
    b == b'<' || b == b'"' || b == b'(' || is_atom_char(b)
}

// Atom chars per RFC 822: printable ASCII minus specials and space.
fn is_atom_char(b: u8) -> bool {
    if !(33..=126).contains(&b) {
        return false;
    }
    !matches!(
        b,
        b'(' | b')'
            | b'<'
            | b'>'
            | b'@'
            | b','
            | b';'
            | b':'
            | b'\\'
            | b'"'
            | b'.'
            | b'['
            | b']'
    )
}

struct Scanner<'a> {
    raw: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(raw: &'a str, pos: usize) -> Self {
        Self {
            raw,
            bytes: raw.as_bytes(),
            pos,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    /// Linear whitespace and (nested) parenthesized comments.
    fn skip_cfws(&mut self) {
        loop {
            match self.peek() {
                Some(b' ' | b'\t' | b'\r' | b'\n') => {
                    self.pos += 1;
                }
                Some(b'(') => {
                    if !self.skip_comment() {
                        return;
                    }
                }
                _ => return,
            }
        }
    }

    fn skip_comment(&mut self) -> bool {
        let start = self.pos;
        self.pos += 1;
        let mut depth = 1usize;
        while let Some(b) = self.bump() {
            match b {
                b'\\' => {
                    self.bump();
                }
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return true;
                    }
                }
                _ => {}
            }
        }
        // unterminated comment: not CFWS after all
        self.pos = start;
        false
    }

    /// `local@domain`, with CFWS allowed between tokens.
    fn parse_addr_spec(&mut self) -> Option<String> {
        self.skip_cfws();
        let local = self.parse_dotted(Self::parse_word)?;
        self.skip_cfws();
        if self.peek() != Some(b'@') {
            return None;
        }
        self.pos += 1;
        self.skip_cfws();
        let domain = self.parse_dotted(Self::parse_domain_part)?;
        Some(format!("{local}@{domain}"))
    }

    /// `<addr-spec>`, optionally prefixed by an `@host,@host:` source route.
    fn parse_route_addr(&mut self) -> Option<String> {
        if self.peek() != Some(b'<') {
            return None;
        }
        self.pos += 1;
        self.skip_cfws();

        let checkpoint = self.pos;
        if self.peek() == Some(b'@') {
            let mut route_ok = true;
            while self.peek() == Some(b'@') {
                self.pos += 1;
                self.skip_cfws();
                if self.parse_dotted(Self::parse_domain_part).is_none() {
                    route_ok = false;
                    break;
                }
                self.skip_cfws();
                if self.peek() == Some(b',') {
                    self.pos += 1;
                    self.skip_cfws();
                }
            }
            if route_ok && self.peek() == Some(b':') {
                self.pos += 1;
            } else {
                self.pos = checkpoint;
            }
        }

        let address = self.parse_addr_spec()?;
        self.skip_cfws();
        if self.peek() != Some(b'>') {
            return None;
        }
        self.pos += 1;
        Some(address)
    }

    /// One or more parts joined by dots; CFWS may surround each dot.
    fn parse_dotted(&mut self, part: fn(&mut Self) -> Option<&'a str>) -> Option<String> {
        let mut out = part(self)?.to_string();
        loop {
            let checkpoint = self.pos;
            self.skip_cfws();
            if self.peek() != Some(b'.') {
                self.pos = checkpoint;
                return Some(out);
            }
            self.pos += 1;
            self.skip_cfws();
            match part(self) {
                Some(next) => {
                    out.push('.');
                    out.push_str(next);
                }
                None => {
                    self.pos = checkpoint;
                    return Some(out);
                }
            }
        }
    }

    fn parse_word(&mut self) -> Option<&'a str> {
        self.parse_quoted_string().or_else(|| self.parse_atom())
    }

    fn parse_domain_part(&mut self) -> Option<&'a str> {
        self.parse_domain_literal().or_else(|| self.parse_atom())
    }

    fn parse_atom(&mut self) -> Option<&'a str> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if !is_atom_char(b) {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start {
            None
        } else {
            Some(&self.raw[start..self.pos])
        }
    }

    /// `"..."` with backslash escapes, returned with its quotes.
    fn parse_quoted_string(&mut self) -> Option<&'a str> {
        if self.peek() != Some(b'"') {
            return None;
        }
        let start = self.pos;
        self.pos += 1;
        while let Some(b) = self.bump() {
            match b {
                b'\\' => {
                    if self.bump().is_none() {
                        break;
                    }
                }
                b'"' => return Some(&self.raw[start..self.pos]),
                b'\r' | b'\n' => break,
                _ => {}
            }
        }
        self.pos = start;
        None
    }

    /// `[...]` with backslash escapes, returned with its brackets.
    fn parse_domain_literal(&mut self) -> Option<&'a str> {
        if self.peek() != Some(b'[') {
            return None;
        }
        let start = self.pos;
        self.pos += 1;
        while let Some(b) = self.bump() {
            match b {
                b'\\' => {
                    if self.bump().is_none() {
                        break;
                    }
                }
                b']' => return Some(&self.raw[start..self.pos]),
                b'[' | b'\r' | b'\n' => break,
                _ => {}
            }
        }
        self.pos = start;
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_addresses_match() {
        assert_eq!(extract_email("a@b.com").as_deref(), Some("a@b.com"));
        assert_eq!(
            extract_email("contact jane.doe@example.com please").as_deref(),
            Some("jane.doe@example.com")
        );
    }

    #[test]
    fn display_name_and_angle_brackets() {
        assert_eq!(
            extract_email("Jane Doe <jane.doe@example.com>").as_deref(),
            Some("jane.doe@example.com")
        );
        // an unterminated bracket falls back to the bare addr-spec inside it
        assert_eq!(
            extract_email("Jane <unterminated@example.com").as_deref(),
            Some("unterminated@example.com")
        );
    }

    #[test]
    fn quoted_local_parts_survive() {
        assert_eq!(
            extract_email("\"odd local\"@example.org").as_deref(),
            Some("\"odd local\"@example.org")
        );
        assert_eq!(
            extract_email("\"Jane Q.\" <jq@example.org>").as_deref(),
            Some("jq@example.org")
        );
    }

    #[test]
    fn comments_are_ignorable_whitespace() {
        assert_eq!(
            extract_email("jane(work)@example.com").as_deref(),
            Some("jane@example.com")
        );
        assert_eq!(
            extract_email("(re: invoice) billing@shop.example").as_deref(),
            Some("billing@shop.example")
        );
    }

    #[test]
    fn domain_literals_are_kept() {
        assert_eq!(
            extract_email("postmaster@[10.0.0.1]").as_deref(),
            Some("postmaster@[10.0.0.1]")
        );
    }

    #[test]
    fn source_routes_are_stripped() {
        assert_eq!(
            extract_email("<@relay.example,@hub.example:jane@example.com>").as_deref(),
            Some("jane@example.com")
        );
    }

    #[test]
    fn first_of_multiple_addresses_wins() {
        assert_eq!(
            extract_email("a@b.com, c@d.org").as_deref(),
            Some("a@b.com")
        );
    }

    #[test]
    fn garbage_is_no_value() {
        assert_eq!(extract_email(""), None);
        assert_eq!(extract_email("no address here"), None);
        assert_eq!(extract_email("half@"), None);
        assert_eq!(extract_email("@half.com"), None);
    }
}
