//! Command line: `otscribe-bench <party> <port> [log2]`.

use otscribe_engine::Role;

pub const USAGE: &str = "usage: otscribe-bench <party 1|2> <port> [log2 size]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Args {
    pub role: Role,
    /// Base port. Channel `i` uses `port + i`.
    pub port: u16,
    /// log2 of the bulk request. `None` = config default.
    pub log2: Option<u32>,
}

impl Args {
    /// Parse the arguments that follow the program name.
    pub fn parse<I>(args: I) -> Result<Self, ArgsError>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let mut args = args.into_iter().map(Into::into);

        let party = args.next().ok_or(ArgsError::Usage)?;
        let role = match party.as_str() {
            "alice" => Some(Role::Alice),
            "bob" => Some(Role::Bob),
            n => n.parse::<u8>().ok().and_then(Role::from_party),
        };
        let role = role.ok_or(ArgsError::Party(party))?;

        let port = args.next().ok_or(ArgsError::Usage)?;
        let port = port.parse::<u16>().map_err(|_| ArgsError::Port(port))?;

        let log2 = match args.next() {
            Some(v) => Some(v.parse::<u32>().map_err(|_| ArgsError::Log2(v))?),
            None => None,
        };

        if args.next().is_some() {
            return Err(ArgsError::Usage);
        }

        Ok(Self { role, port, log2 })
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ArgsError {
    #[error("wrong number of arguments")]
    Usage,
    #[error("party must be 1 or 2, got {0:?}")]
    Party(String),
    #[error("invalid port {0:?}")]
    Port(String),
    #[error("invalid log2 size {0:?}")]
    Log2(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_command_line() {
        let args = Args::parse(["1", "12345", "20"]).unwrap();
        assert_eq!(args.role, Role::Alice);
        assert_eq!(args.port, 12345);
        assert_eq!(args.log2, Some(20));
    }

    #[test]
    fn log2_is_optional() {
        let args = Args::parse(["bob", "9000"]).unwrap();
        assert_eq!(args.role, Role::Bob);
        assert_eq!(args.log2, None);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(Args::parse(Vec::<String>::new()), Err(ArgsError::Usage)));
        assert!(matches!(Args::parse(["1"]), Err(ArgsError::Usage)));
        assert!(matches!(Args::parse(["3", "1"]), Err(ArgsError::Party(_))));
        assert!(matches!(Args::parse(["0", "1"]), Err(ArgsError::Party(_))));
        assert!(matches!(Args::parse(["carol", "1"]), Err(ArgsError::Party(_))));
        assert!(matches!(Args::parse(["1", "70000"]), Err(ArgsError::Port(_))));
        assert!(matches!(Args::parse(["1", "1", "-4"]), Err(ArgsError::Log2(_))));
        assert!(matches!(Args::parse(["1", "1", "4", "x"]), Err(ArgsError::Usage)));
    }
}
