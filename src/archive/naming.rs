use chrono::NaiveDate;

use crate::error::{ArchiveError, Result};
use crate::models::PackedTimestamp;

pub const FILE_PREFIX: &str = "dispersion_";
pub const FILE_EXTENSION: &str = ".nc";

/// `dispersion_{date_code}_{time_code:06}.nc`
pub fn canonical_file_name(key: &PackedTimestamp) -> String {
    format!(
        "{}{}_{:06}{}",
        FILE_PREFIX, key.date_code, key.time_code, FILE_EXTENSION
    )
}

pub fn parse_canonical_file_name(file_name: &str) -> Result<PackedTimestamp> {
    let invalid = || ArchiveError::InvalidFileName(file_name.to_string());

    let stem = file_name
        .strip_prefix(FILE_PREFIX)
        .and_then(|s| s.strip_suffix(FILE_EXTENSION))
        .ok_or_else(invalid)?;

    let (date_part, time_part) = stem.split_once('_').ok_or_else(invalid)?;
    if date_part.len() != 7
        || time_part.len() != 6
        || !date_part.bytes().all(|b| b.is_ascii_digit())
        || !time_part.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(invalid());
    }

    let date_code = date_part.parse::<i32>().map_err(|_| invalid())?;
    let time_code = time_part.parse::<i32>().map_err(|_| invalid())?;

    PackedTimestamp::new(date_code, time_code)
}

/// `dispersion_{YYYYMMDD}.nc`, the name a download gets from its request date.
pub fn request_file_name(date: NaiveDate) -> String {
    format!("{}{}{}", FILE_PREFIX, date.format("%Y%m%d"), FILE_EXTENSION)
}

pub fn parse_request_file_name(file_name: &str) -> Result<NaiveDate> {
    let stem = file_name
        .strip_prefix(FILE_PREFIX)
        .and_then(|s| s.strip_suffix(FILE_EXTENSION))
        .filter(|s| s.len() == 8)
        .ok_or_else(|| ArchiveError::InvalidFileName(file_name.to_string()))?;

    NaiveDate::parse_from_str(stem, "%Y%m%d")
        .map_err(|_| ArchiveError::InvalidFileName(file_name.to_string()))
}

/// Hidden sibling used while a file is being written.
pub fn partial_file_name(file_name: &str) -> String {
    format!(".{}.partial", file_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_name_round_trip() {
        let key = PackedTimestamp::new(2021059, 25055).unwrap();
        let name = canonical_file_name(&key);
        assert_eq!(name, "dispersion_2021059_025055.nc");
        assert_eq!(parse_canonical_file_name(&name).unwrap(), key);

        let midnight = PackedTimestamp::new(2025316, 0).unwrap();
        assert_eq!(canonical_file_name(&midnight), "dispersion_2025316_000000.nc");
    }

    #[test]
    fn test_rejects_non_canonical_names() {
        for name in [
            "dispersion_20210304.nc",
            "dispersion_2021059_25055.nc",
            "dispersion_2021059_025055.txt",
            "dispersion_2021400_025055.nc",
            "dispersion_2021059_245055.nc",
            "other_2021059_025055.nc",
            "dispersion_202105a_025055.nc",
        ] {
            assert!(
                parse_canonical_file_name(name).is_err(),
                "{} should not parse",
                name
            );
        }
    }

    #[test]
    fn test_request_file_name() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 25).unwrap();
        assert_eq!(request_file_name(date), "dispersion_20240625.nc");
        assert_eq!(parse_request_file_name("dispersion_20240625.nc").unwrap(), date);
        assert!(parse_request_file_name("dispersion_2021059_025055.nc").is_err());
        assert!(parse_request_file_name("dispersion_20241325.nc").is_err());
    }

    #[test]
    fn test_partial_file_name() {
        assert_eq!(
            partial_file_name("dispersion_20240625.nc"),
            ".dispersion_20240625.nc.partial"
        );
    }
}
