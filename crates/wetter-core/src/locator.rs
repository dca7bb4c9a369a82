//! Deterministic mapping from a series and granularity to a file path.
//!
//! Directory layout below the storage root:
//!
//! ```text
//! <root>/<location>/<quantity>/24h.dat
//! <root>/<location>/<quantity>/31d.dat
//! <root>/<location>/<quantity>/<year>.dat
//! <root>/<location>/<quantity>/<year>/<month>.dat
//! ```
//!
//! Months are not zero padded (`2024/3.dat`).

use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// Time span covered by one buffer file of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Granularity {
    /// Raw samples of the last 24 hours (ring)
    Last24h,
    /// Hourly rollups of the last 31 days (ring)
    Last31d,
    /// Daily rollups of one calendar year (sequence)
    Year(i32),
    /// Hourly rollups of one calendar month (sequence)
    Month(i32, u32),
}

/// Locates the buffer files of every series below one storage root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLocator {
    data_dir: PathBuf,
}

impl DataLocator {
    /// Create a locator for `data_dir`, which must exist and be a directory.
    pub fn new(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        let canonical = fs::canonicalize(data_dir).map_err(|e| {
            Error::Configuration(format!(
                "could not determine the canonical path of {}: {}",
                data_dir.display(),
                e
            ))
        })?;

        if !canonical.is_dir() {
            return Err(Error::Configuration(format!(
                "{} is not a directory",
                canonical.display()
            )));
        }

        Ok(Self {
            data_dir: canonical,
        })
    }

    /// The canonical storage root.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn location_dir(&self, location: &str) -> PathBuf {
        self.data_dir.join(location)
    }

    /// Directory holding all buffers of one series.
    pub fn series_dir(&self, location: &str, quantity: &str) -> PathBuf {
        self.location_dir(location).join(quantity)
    }

    pub fn path_24h(&self, location: &str, quantity: &str) -> PathBuf {
        self.series_dir(location, quantity).join("24h.dat")
    }

    pub fn path_31d(&self, location: &str, quantity: &str) -> PathBuf {
        self.series_dir(location, quantity).join("31d.dat")
    }

    pub fn year_path(&self, location: &str, quantity: &str, year: i32) -> PathBuf {
        self.series_dir(location, quantity)
            .join(format!("{year}.dat"))
    }

    pub fn month_path(&self, location: &str, quantity: &str, year: i32, month: u32) -> PathBuf {
        self.series_dir(location, quantity)
            .join(year.to_string())
            .join(format!("{month}.dat"))
    }

    /// Path of the buffer covering `granularity`.
    pub fn path(&self, location: &str, quantity: &str, granularity: Granularity) -> PathBuf {
        match granularity {
            Granularity::Last24h => self.path_24h(location, quantity),
            Granularity::Last31d => self.path_31d(location, quantity),
            Granularity::Year(year) => self.year_path(location, quantity, year),
            Granularity::Month(year, month) => self.month_path(location, quantity, year, month),
        }
    }
}

/// Check that `name` is usable as a single directory name below the root.
///
/// Rejects empty names, separators, `.` and `..`, so a location or quantity
/// can never escape its parent directory.
pub fn check_name(kind: &'static str, name: &str) -> Result<()> {
    let mut components = Path::new(name).components();
    let single_normal = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(part)), None) if part == name
    );

    if !single_normal {
        return Err(Error::InvalidName {
            kind,
            name: name.into(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_requires_existing_directory() {
        let dir = tempfile::tempdir().unwrap();

        assert!(matches!(
            DataLocator::new(dir.path().join("missing")),
            Err(Error::Configuration(_))
        ));

        let file = dir.path().join("file");
        fs::write(&file, b"").unwrap();
        assert!(matches!(
            DataLocator::new(&file),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_paths() {
        let dir = tempfile::tempdir().unwrap();
        let locator = DataLocator::new(dir.path()).unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();

        assert_eq!(locator.data_dir(), root);
        assert_eq!(
            locator.path_24h("garden", "temperature"),
            root.join("garden/temperature/24h.dat")
        );
        assert_eq!(
            locator.path_31d("garden", "temperature"),
            root.join("garden/temperature/31d.dat")
        );
        assert_eq!(
            locator.year_path("garden", "temperature", 2024),
            root.join("garden/temperature/2024.dat")
        );
        assert_eq!(
            locator.month_path("garden", "temperature", 2024, 3),
            root.join("garden/temperature/2024/3.dat")
        );
    }

    #[test]
    fn test_path_by_granularity_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let locator = DataLocator::new(dir.path()).unwrap();

        for granularity in [
            Granularity::Last24h,
            Granularity::Last31d,
            Granularity::Year(2021),
            Granularity::Month(2021, 12),
        ] {
            assert_eq!(
                locator.path("roof", "pressure", granularity),
                locator.path("roof", "pressure", granularity)
            );
        }
        assert_eq!(
            locator.path("roof", "pressure", Granularity::Month(2021, 12)),
            locator.month_path("roof", "pressure", 2021, 12)
        );
    }

    #[test]
    fn test_relative_root_is_canonicalized() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("data")).unwrap();
        let locator = DataLocator::new(dir.path().join("data/../data")).unwrap();
        assert_eq!(
            locator.data_dir(),
            fs::canonicalize(dir.path().join("data")).unwrap()
        );
    }

    #[test]
    fn test_check_name() {
        assert!(check_name("location", "garden").is_ok());
        assert!(check_name("quantity", "temperature_2").is_ok());

        for bad in ["", ".", "..", "a/b", "/etc", "garden/"] {
            assert!(
                matches!(check_name("location", bad), Err(Error::InvalidName { .. })),
                "{bad:?} must be rejected"
            );
        }
    }
}
