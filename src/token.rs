//! Sequence tokens for superseding asynchronous calls.
//!
//! Every issued call carries a token. A response is only applied when its token is
//! still the latest one its owner issued; everything else is a stale response and
//! gets dropped on arrival. There is no real cancellation underneath.

/// Monotonically increasing identifier of one issued call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SequenceToken(u64);

impl SequenceToken {
    pub fn value(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SequenceToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What became of a resolved call.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<T, E> {
    /// The call was current and its result is now visible state.
    Applied(T),
    /// The call was current and failed; prior state was kept.
    Failed(E),
    /// A newer call superseded this one; the result was dropped.
    Stale,
}

/// Issues tokens and remembers which one is current.
#[derive(Debug, Default)]
pub struct TokenSource {
    issued: u64,
    current: Option<SequenceToken>,
}

impl TokenSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a fresh token and make it the current one.
    pub fn issue(&mut self) -> SequenceToken {
        self.issued += 1;
        let token = SequenceToken(self.issued);
        self.current = Some(token);
        token
    }

    /// Make every token issued so far stale.
    pub fn supersede(&mut self) {
        self.current = None;
    }

    pub fn is_current(&self, token: SequenceToken) -> bool {
        self.current == Some(token)
    }

    /// Consume the current token once its call resolved.
    ///
    /// Returns `false` (and leaves state untouched) for stale tokens.
    pub fn settle(&mut self, token: SequenceToken) -> bool {
        if self.is_current(token) {
            self.current = None;
            true
        } else {
            false
        }
    }

    pub fn in_flight(&self) -> bool {
        self.current.is_some()
    }
}
