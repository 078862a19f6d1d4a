// The backtracking core. Works directly on pattern bytes, so repeats hand
// back characters when the tail fails and captures participate in
// backtracking, matching the reference semantics.

use std::fmt;

const MAX_CAPTURES: usize = 32;
const MAX_MATCH_DEPTH: u32 = 200;

#[derive(Debug, Clone, PartialEq)]
pub struct PatternError(pub String);

impl fmt::Display for PatternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for PatternError {}

fn pattern_error(msg: &str) -> PatternError {
    PatternError(msg.to_string())
}

/// One capture of a finished match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capture {
    /// Byte range into the subject.
    Span { start: usize, end: usize },
    /// `()` position capture: 1-based byte position.
    Position(usize),
}

#[derive(Debug, Clone)]
pub struct MatchResult {
    pub start: usize,
    pub end: usize,
    pub captures: Vec<Capture>,
}

#[derive(Clone, Copy)]
enum CapState {
    Unclosed,
    Position,
    Closed(usize),
}

struct MatchState<'a> {
    src: &'a [u8],
    pat: &'a [u8],
    caps: Vec<(usize, CapState)>,
    depth: u32,
}

/// Find the first match at or after `init`. A leading `^` anchors to
/// `init` exactly.
pub fn first_match(
    src: &[u8],
    pat: &[u8],
    init: usize,
) -> Result<Option<MatchResult>, PatternError> {
    let anchored = pat.first() == Some(&b'^');
    let pat_body = if anchored { &pat[1..] } else { pat };

    let mut start = init.min(src.len());
    loop {
        let mut state = MatchState {
            src,
            pat: pat_body,
            caps: Vec::new(),
            depth: 0,
        };
        if let Some(end) = state.do_match(start, 0)? {
            return Ok(Some(MatchResult {
                start,
                end,
                captures: finished_captures(&state)?,
            }));
        }
        if anchored || start >= src.len() {
            return Ok(None);
        }
        start += 1;
    }
}

fn finished_captures(state: &MatchState) -> Result<Vec<Capture>, PatternError> {
    state
        .caps
        .iter()
        .map(|(start, cap)| match cap {
            CapState::Closed(len) => Ok(Capture::Span {
                start: *start,
                end: start + len,
            }),
            CapState::Position => Ok(Capture::Position(start + 1)),
            CapState::Unclosed => Err(pattern_error("unfinished capture")),
        })
        .collect()
}

fn class_match(c: u8, class: u8) -> bool {
    let result = match class.to_ascii_lowercase() {
        b'a' => c.is_ascii_alphabetic(),
        b'c' => c.is_ascii_control(),
        b'd' => c.is_ascii_digit(),
        b'g' => c.is_ascii_graphic(),
        b'l' => c.is_ascii_lowercase(),
        b'p' => c.is_ascii_punctuation(),
        b's' => c == b' ' || (0x09..=0x0d).contains(&c),
        b'u' => c.is_ascii_uppercase(),
        b'w' => c.is_ascii_alphanumeric(),
        b'x' => c.is_ascii_hexdigit(),
        _ => return c == class,
    };
    if class.is_ascii_uppercase() {
        !result
    } else {
        result
    }
}

impl<'a> MatchState<'a> {
    /// End index (exclusive) of the single-character item starting at `p`.
    fn class_end(&self, p: usize) -> Result<usize, PatternError> {
        match self.pat.get(p) {
            None => Err(pattern_error("malformed pattern (ends unexpectedly)")),
            Some(b'%') => {
                if p + 1 >= self.pat.len() {
                    Err(pattern_error("malformed pattern (ends with '%')"))
                } else {
                    Ok(p + 2)
                }
            }
            Some(b'[') => {
                let mut i = p + 1;
                if self.pat.get(i) == Some(&b'^') {
                    i += 1;
                }
                // A leading ']' is a literal member.
                if self.pat.get(i) == Some(&b']') {
                    i += 1;
                }
                loop {
                    match self.pat.get(i) {
                        None => return Err(pattern_error("malformed pattern (missing ']')")),
                        Some(b'%') => i += 2,
                        Some(b']') => return Ok(i + 1),
                        _ => i += 1,
                    }
                }
            }
            Some(_) => Ok(p + 1),
        }
    }

    fn match_bracket_class(&self, c: u8, p: usize, ec: usize) -> bool {
        // p points at '[', ec at the closing ']'.
        let mut i = p + 1;
        let mut negated = false;
        if self.pat.get(i) == Some(&b'^') {
            negated = true;
            i += 1;
        }
        let mut found = false;
        while i < ec {
            if self.pat[i] == b'%' && i + 1 < ec {
                i += 1;
                if class_match(c, self.pat[i]) {
                    found = true;
                }
                i += 1;
            } else if i + 2 < ec && self.pat[i + 1] == b'-' {
                if self.pat[i] <= c && c <= self.pat[i + 2] {
                    found = true;
                }
                i += 3;
            } else {
                if self.pat[i] == c {
                    found = true;
                }
                i += 1;
            }
        }
        negated != found
    }

    fn single_match(&self, s: usize, p: usize, ep: usize) -> bool {
        let Some(&c) = self.src.get(s) else {
            return false;
        };
        match self.pat[p] {
            b'.' => true,
            b'%' => class_match(c, self.pat[p + 1]),
            b'[' => self.match_bracket_class(c, p, ep - 1),
            literal => literal == c,
        }
    }

    fn do_match(&mut self, s: usize, p: usize) -> Result<Option<usize>, PatternError> {
        self.depth += 1;
        if self.depth > MAX_MATCH_DEPTH {
            self.depth -= 1;
            return Err(pattern_error("pattern too complex"));
        }
        let result = self.do_match_inner(s, p);
        self.depth -= 1;
        result
    }

    fn do_match_inner(&mut self, s: usize, p: usize) -> Result<Option<usize>, PatternError> {
        if p >= self.pat.len() {
            return Ok(Some(s));
        }
        match self.pat[p] {
            b'(' => {
                if self.pat.get(p + 1) == Some(&b')') {
                    self.start_capture(s, CapState::Position, p + 2)
                } else {
                    self.start_capture(s, CapState::Unclosed, p + 1)
                }
            }
            b')' => self.end_capture(s, p + 1),
            b'$' if p + 1 == self.pat.len() => {
                Ok(if s == self.src.len() { Some(s) } else { None })
            }
            b'%' => match self.pat.get(p + 1) {
                Some(b'b') => self.match_balance(s, p + 2),
                Some(b'f') => self.match_frontier(s, p + 2),
                Some(d @ b'1'..=b'9') => self.match_backref(s, p, (d - b'0') as usize),
                _ => self.match_default(s, p),
            },
            _ => self.match_default(s, p),
        }
    }

    fn match_default(&mut self, s: usize, p: usize) -> Result<Option<usize>, PatternError> {
        let ep = self.class_end(p)?;
        let matched = self.single_match(s, p, ep);
        match self.pat.get(ep) {
            Some(b'?') => {
                if matched {
                    if let Some(r) = self.do_match(s + 1, ep + 1)? {
                        return Ok(Some(r));
                    }
                }
                self.do_match(s, ep + 1)
            }
            Some(b'+') => {
                if matched {
                    self.max_expand(s + 1, p, ep)
                } else {
                    Ok(None)
                }
            }
            Some(b'*') => self.max_expand(s, p, ep),
            Some(b'-') => self.min_expand(s, p, ep),
            _ => {
                if matched {
                    self.do_match(s + 1, ep)
                } else {
                    Ok(None)
                }
            }
        }
    }

    /// Greedy repeat: consume as much as possible, then give back until the
    /// tail matches.
    fn max_expand(&mut self, s: usize, p: usize, ep: usize) -> Result<Option<usize>, PatternError> {
        let mut count = 0;
        while self.single_match(s + count, p, ep) {
            count += 1;
        }
        loop {
            if let Some(r) = self.do_match(s + count, ep + 1)? {
                return Ok(Some(r));
            }
            if count == 0 {
                return Ok(None);
            }
            count -= 1;
        }
    }

    /// Lazy repeat: try the tail first, consuming one character at a time.
    fn min_expand(&mut self, s: usize, p: usize, ep: usize) -> Result<Option<usize>, PatternError> {
        let mut s = s;
        loop {
            if let Some(r) = self.do_match(s, ep + 1)? {
                return Ok(Some(r));
            }
            if self.single_match(s, p, ep) {
                s += 1;
            } else {
                return Ok(None);
            }
        }
    }

    fn start_capture(
        &mut self,
        s: usize,
        kind: CapState,
        p: usize,
    ) -> Result<Option<usize>, PatternError> {
        if self.caps.len() >= MAX_CAPTURES {
            return Err(pattern_error("too many captures"));
        }
        self.caps.push((s, kind));
        let r = self.do_match(s, p)?;
        if r.is_none() {
            self.caps.pop();
        }
        Ok(r)
    }

    fn end_capture(&mut self, s: usize, p: usize) -> Result<Option<usize>, PatternError> {
        let idx = self
            .caps
            .iter()
            .rposition(|(_, c)| matches!(c, CapState::Unclosed))
            .ok_or_else(|| pattern_error("invalid pattern capture"))?;
        let start = self.caps[idx].0;
        self.caps[idx].1 = CapState::Closed(s - start);
        let r = self.do_match(s, p)?;
        if r.is_none() {
            self.caps[idx].1 = CapState::Unclosed;
        }
        Ok(r)
    }

    fn match_balance(&mut self, s: usize, p: usize) -> Result<Option<usize>, PatternError> {
        if p + 1 >= self.pat.len() {
            return Err(pattern_error("malformed pattern (missing arguments to '%b')"));
        }
        let (open, close) = (self.pat[p], self.pat[p + 1]);
        if self.src.get(s) != Some(&open) {
            return Ok(None);
        }
        let mut depth = 1;
        let mut i = s + 1;
        while i < self.src.len() {
            if self.src[i] == close {
                depth -= 1;
                if depth == 0 {
                    return self.do_match(i + 1, p + 2);
                }
            } else if self.src[i] == open {
                depth += 1;
            }
            i += 1;
        }
        Ok(None)
    }

    fn match_frontier(&mut self, s: usize, p: usize) -> Result<Option<usize>, PatternError> {
        if self.pat.get(p) != Some(&b'[') {
            return Err(pattern_error("missing '[' after '%f' in pattern"));
        }
        let ep = self.class_end(p)?;
        let prev = if s == 0 { 0 } else { self.src[s - 1] };
        let curr = self.src.get(s).copied().unwrap_or(0);
        if !self.match_bracket_class(prev, p, ep - 1) && self.match_bracket_class(curr, p, ep - 1)
        {
            self.do_match(s, ep)
        } else {
            Ok(None)
        }
    }

    fn match_backref(
        &mut self,
        s: usize,
        p: usize,
        index: usize,
    ) -> Result<Option<usize>, PatternError> {
        let (start, len) = match self.caps.get(index - 1) {
            Some((start, CapState::Closed(len))) => (*start, *len),
            _ => return Err(pattern_error("invalid capture index")),
        };
        if s + len <= self.src.len() && self.src[start..start + len] == self.src[s..s + len] {
            self.do_match(s + len, p + 2)
        } else {
            Ok(None)
        }
    }
}
