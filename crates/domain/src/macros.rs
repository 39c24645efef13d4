//! Macro for implementing Display and FromStr for status enums
//!
//! Status and action enums are persisted as lowercase strings, so every one
//! of them needs the same Display/FromStr pair. This macro generates both,
//! with case-insensitive parsing and a descriptive error message.

/// Implements Display and FromStr traits for status enums
///
/// # Arguments
///
/// * `$enum_name` - The name of the enum type
/// * `$variant => $str` - Mapping of enum variants to their string
///   representations
#[macro_export]
macro_rules! impl_status_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(Self::$variant => write!(f, $str),)+
                }
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_lowercase().as_str() {
                    $($str => Ok(Self::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($enum_name), s)),
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum TestStatus {
        Pending,
        Processed,
        Aborted,
    }

    impl_status_conversions!(TestStatus {
        Pending => "pending",
        Processed => "processed",
        Aborted => "aborted",
    });

    #[test]
    fn test_display_conversion() {
        assert_eq!(TestStatus::Pending.to_string(), "pending");
        assert_eq!(TestStatus::Processed.to_string(), "processed");
        assert_eq!(TestStatus::Aborted.to_string(), "aborted");
    }

    #[test]
    fn test_fromstr_case_insensitive() {
        assert_eq!(TestStatus::from_str("pending").unwrap(), TestStatus::Pending);
        assert_eq!(TestStatus::from_str("PROCESSED").unwrap(), TestStatus::Processed);
        assert_eq!(TestStatus::from_str("AbOrTeD").unwrap(), TestStatus::Aborted);
    }

    #[test]
    fn test_fromstr_invalid() {
        let err = TestStatus::from_str("unknown").unwrap_err();
        assert!(err.contains("TestStatus"));
        assert!(err.contains("unknown"));
    }
}
