// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Accepted authentication modes.

use std::fmt;
use std::str::FromStr;

/// How a request was authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Caller supplied their own control-plane credential.
    Client,
    /// Requests run under the server's own credential.
    Server,
    /// Caller presented a signed SSO session token.
    Sso,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Client => write!(f, "client"),
            Mode::Server => write!(f, "server"),
            Mode::Sso => write!(f, "sso"),
        }
    }
}

/// The set of modes the gatekeeper will accept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modes {
    pub client: bool,
    pub server: bool,
    pub sso: bool,
}

impl Modes {
    pub fn accepts(&self, mode: Mode) -> bool {
        match mode {
            Mode::Client => self.client,
            Mode::Server => self.server,
            Mode::Sso => self.sso,
        }
    }
}

impl FromStr for Modes {
    type Err = String;

    /// Parse a comma-separated mode list. `hybrid` is shorthand for
    /// `client,server`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut modes = Modes::default();
        for word in s.split(',').map(str::trim).filter(|w| !w.is_empty()) {
            match word {
                "client" => modes.client = true,
                "server" => modes.server = true,
                "sso" => modes.sso = true,
                "hybrid" => {
                    modes.client = true;
                    modes.server = true;
                }
                other => return Err(other.to_string()),
            }
        }
        if modes == Modes::default() {
            return Err("no auth modes listed".to_string());
        }
        Ok(modes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mode_lists() {
        let modes: Modes = "server".parse().unwrap();
        assert!(modes.server && !modes.client && !modes.sso);

        let modes: Modes = "hybrid".parse().unwrap();
        assert!(modes.server && modes.client && !modes.sso);

        let modes: Modes = "client, sso".parse().unwrap();
        assert!(modes.client && modes.sso && !modes.server);

        assert!("".parse::<Modes>().is_err());
        assert!("token".parse::<Modes>().is_err());
    }
}
