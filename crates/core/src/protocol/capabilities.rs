use std::fmt;

/// Methods a server advertises in the `Public` header of its OPTIONS
/// response (RFC 2326 §12.28), as a bitmask.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Capabilities(u32);

impl Capabilities {
    pub const NONE: Self = Self(0);
    pub const OPTIONS: Self = Self(1 << 1);
    pub const DESCRIBE: Self = Self(1 << 2);
    pub const ANNOUNCE: Self = Self(1 << 3);
    pub const SETUP: Self = Self(1 << 4);
    pub const PLAY: Self = Self(1 << 5);
    pub const RECORD: Self = Self(1 << 6);
    pub const PAUSE: Self = Self(1 << 7);
    pub const TEARDOWN: Self = Self(1 << 8);
    pub const SET_PARAMETER: Self = Self(1 << 9);
    pub const GET_PARAMETER: Self = Self(1 << 10);
    pub const REDIRECT: Self = Self(1 << 11);

    const NAMES: [(&'static str, Self); 11] = [
        ("options", Self::OPTIONS),
        ("describe", Self::DESCRIBE),
        ("announce", Self::ANNOUNCE),
        ("setup", Self::SETUP),
        ("play", Self::PLAY),
        ("record", Self::RECORD),
        ("pause", Self::PAUSE),
        ("teardown", Self::TEARDOWN),
        ("set_parameter", Self::SET_PARAMETER),
        ("get_parameter", Self::GET_PARAMETER),
        ("redirect", Self::REDIRECT),
    ];

    /// Parse a `Public` header value. Unknown tokens are ignored.
    ///
    /// ```
    /// use rtsp::protocol::Capabilities;
    ///
    /// let caps = Capabilities::parse("OPTIONS, DESCRIBE, SETUP, PLAY");
    /// assert!(caps.contains(Capabilities::PLAY));
    /// assert!(!caps.contains(Capabilities::TEARDOWN));
    /// ```
    pub fn parse(public: &str) -> Self {
        let mut mask = Self::NONE;
        for token in public.split(',') {
            let token = token.trim().to_ascii_lowercase();
            if let Some((_, cap)) = Self::NAMES.iter().find(|(name, _)| *name == token) {
                mask.0 |= cap.0;
            }
        }
        mask
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(_, cap)| self.contains(*cap))
            .map(|(name, _)| *name)
            .collect();
        write!(f, "Capabilities({})", names.join("|"))
    }
}
