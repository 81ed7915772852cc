use chrono::{Datelike, Duration, Local, NaiveDate};
use std::path::PathBuf;

/// Default manifest path with format: output/firesmoke-manifest-{YYMMDD}.csv
pub fn generate_default_manifest_filename() -> PathBuf {
    let now = Local::now();
    let year = now.year() % 100;

    let filename = format!(
        "firesmoke-manifest-{:02}{:02}{:02}.csv",
        year,
        now.month(),
        now.day()
    );
    PathBuf::from("output").join(filename)
}

/// Frame image name: `frames000042.png`
pub fn frame_file_name(frame_number: usize) -> String {
    format!(
        "{}{:0width$}.png",
        super::constants::FRAME_FILE_PREFIX,
        frame_number,
        width = super::constants::FRAME_NUMBER_WIDTH
    )
}

/// The daily fetch targets the previous local day.
pub fn yesterday() -> NaiveDate {
    Local::now().date_naive() - Duration::days(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_default_manifest_filename() {
        let filename = generate_default_manifest_filename();
        let filename_str = filename.to_string_lossy();

        assert!(filename_str.starts_with("output/"));
        assert!(filename_str.contains("firesmoke-manifest-"));
        assert!(filename_str.ends_with(".csv"));
    }

    #[test]
    fn test_frame_file_name() {
        assert_eq!(frame_file_name(0), "frames000000.png");
        assert_eq!(frame_file_name(42), "frames000042.png");
    }

    #[test]
    fn test_yesterday_is_before_today() {
        assert!(yesterday() < Local::now().date_naive());
    }
}
