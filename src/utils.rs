use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

static YEAR_IN_NAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d{4}").unwrap());
static TICKER_IN_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z][A-Za-z.\-]*)_").unwrap());

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or("")
}

/// First plausible four-digit year in the file name (`ACME_2023.pdf` -> 2023).
pub fn fiscal_year_from_path(path: &Path) -> Option<i32> {
    YEAR_IN_NAME
        .find_iter(file_name(path))
        .filter_map(|m| m.as_str().parse::<i32>().ok())
        .find(|year| (1900..=2100).contains(year))
}

pub fn fiscal_year_or_default(path: &Path, default_year: i32) -> i32 {
    fiscal_year_from_path(path).unwrap_or(default_year)
}

/// Ticker prefix of the `TICKER_YEAR.pdf` naming convention, upper-cased.
pub fn ticker_from_path(path: &Path) -> Option<String> {
    TICKER_IN_NAME
        .captures(file_name(path))
        .map(|caps| caps[1].to_uppercase())
}

/// Parses a year key as written by the oracle ("2023", "FY2023", " 2023 ").
pub fn parse_year_key(key: &str) -> Option<i32> {
    let digits: String = key.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() != 4 {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_year_from_file_name() {
        assert_eq!(
            fiscal_year_from_path(&PathBuf::from("/pdfs/ASML_2021.pdf")),
            Some(2021)
        );
        assert_eq!(
            fiscal_year_from_path(&PathBuf::from("annual-report-0042-2019.pdf")),
            Some(2019)
        );
        assert_eq!(fiscal_year_from_path(&PathBuf::from("report.pdf")), None);
        assert_eq!(
            fiscal_year_or_default(&PathBuf::from("report.pdf"), 2024),
            2024
        );
    }

    #[test]
    fn test_directory_digits_are_ignored() {
        assert_eq!(
            fiscal_year_from_path(&PathBuf::from("/data/2020/report.pdf")),
            None
        );
    }

    #[test]
    fn test_ticker_from_file_name() {
        assert_eq!(
            ticker_from_path(&PathBuf::from("asml_2023.pdf")),
            Some("ASML".to_string())
        );
        assert_eq!(
            ticker_from_path(&PathBuf::from("BRK.B_2022.pdf")),
            Some("BRK.B".to_string())
        );
        assert_eq!(ticker_from_path(&PathBuf::from("2023.pdf")), None);
    }

    #[test]
    fn test_year_keys() {
        assert_eq!(parse_year_key("2023"), Some(2023));
        assert_eq!(parse_year_key("FY2022"), Some(2022));
        assert_eq!(parse_year_key("Revenue"), None);
        assert_eq!(parse_year_key("20234"), None);
    }
}
