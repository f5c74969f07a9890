use crate::services::error::ScanError;
use chrono::DateTime;

/// Token the scanner prints for a clean file
pub const CLEAN_SENTINEL: &str = "[OK]";

/// Verdict fields that come straight out of the scan command's stdout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedOutput {
    pub infected: bool,
    pub signature_match: String,
}

/// Parse `scan -abfu` stdout.
///
/// Clean output carries `[OK]` anywhere. Anything else is an infection whose
/// signature name is the second tab-separated field.
pub fn parse_output(raw: &str) -> Result<ParsedOutput, ScanError> {
    if raw.contains(CLEAN_SENTINEL) {
        return Ok(ParsedOutput {
            infected: false,
            signature_match: String::new(),
        });
    }

    let signature = raw.split('\t').nth(1).ok_or_else(|| {
        ScanError::MalformedOutput(format!(
            "expected tab-separated fields, got {:?}",
            raw.trim()
        ))
    })?;

    Ok(ParsedOutput {
        infected: true,
        signature_match: signature.trim().to_string(),
    })
}

/// Reformat a `Mon, 02 Jan 2006 15:04:05 +0000` timestamp as `YYYYMMDD`.
///
/// Unparsable input yields the zero date `00010101`.
pub fn parse_updated_date(date: &str) -> String {
    DateTime::parse_from_str(date.trim(), "%a, %d %b %Y %H:%M:%S %z")
        .map(|t| t.format("%Y%m%d").to_string())
        .unwrap_or_else(|_| "00010101".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_output() {
        let parsed = parse_output("some/path [OK]").unwrap();
        assert!(!parsed.infected);
        assert_eq!(parsed.signature_match, "");
    }

    #[test]
    fn test_clean_sentinel_wins_over_tabs() {
        let parsed = parse_output("/malware/file\tsomething\t[OK]\n").unwrap();
        assert!(!parsed.infected);
        assert!(parsed.signature_match.is_empty());
    }

    #[test]
    fn test_infected_output() {
        let parsed = parse_output("some/path\tTrojan.Generic\t[FOUND]").unwrap();
        assert!(parsed.infected);
        assert_eq!(parsed.signature_match, "Trojan.Generic");
    }

    #[test]
    fn test_infected_output_is_trimmed() {
        let raw = "/malware/EICAR\t  Win32:EICAR-Test [Tool] \n";
        let parsed = parse_output(raw).unwrap();
        assert!(parsed.infected);
        assert_eq!(parsed.signature_match, "Win32:EICAR-Test [Tool]");
    }

    #[test]
    fn test_output_without_tab_is_malformed() {
        let err = parse_output("scan: daemon not running").unwrap_err();
        assert!(matches!(err, ScanError::MalformedOutput(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_empty_output_is_malformed() {
        assert!(matches!(
            parse_output("").unwrap_err(),
            ScanError::MalformedOutput(_)
        ));
    }

    #[test]
    fn test_parse_is_idempotent() {
        let raw = "some/path\tTrojan.Generic\t[FOUND]";
        assert_eq!(parse_output(raw).unwrap(), parse_output(raw).unwrap());
    }

    #[test]
    fn test_parse_updated_date() {
        assert_eq!(
            parse_updated_date("Mon, 24 Jul 2017 18:11:20 +0000"),
            "20170724"
        );
    }

    #[test]
    fn test_parse_updated_date_invalid_is_zero_date() {
        assert_eq!(parse_updated_date("yesterday"), "00010101");
    }
}
