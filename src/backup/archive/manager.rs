use crate::backup::archive::cli::CliZipCreator;
use crate::backup::archive::library::LibraryZipCreator;
use crate::backup::archive::{ZipCreator, ZipStrategy};
use crate::backup::process::ProcessRunner;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;

use std::sync::Arc;

/// Picks a `ZipCreator` by preference and availability
///
/// Availability is probed on every call, nothing is cached, so a tool
/// installed or removed while the process runs is noticed.
#[derive(Clone, Debug)]
pub struct ZipManager {
    cli: Arc<dyn ZipCreator>,
    library: Arc<dyn ZipCreator>,
}

impl ZipManager {
    pub fn new(cli: Arc<dyn ZipCreator>, library: Arc<dyn ZipCreator>) -> Self {
        Self { cli, library }
    }

    pub fn system<S: Into<String>>(runner: Arc<dyn ProcessRunner>, archiver_binary: S) -> Self {
        Self::new(
            Arc::new(CliZipCreator::new(runner, archiver_binary)),
            Arc::new(LibraryZipCreator),
        )
    }

    /// Priority: explicit preference, then CLI, then library.
    pub fn resolve(&self, preference: ZipStrategy) -> Result<Arc<dyn ZipCreator>> {
        match preference {
            ZipStrategy::Cli => self.require(&self.cli, "7z is not installed, install p7zip-full"),
            ZipStrategy::Library => {
                self.require(&self.library, "the zip library is not available")
            }
            ZipStrategy::Auto => {
                if self.cli.is_available() {
                    Ok(self.cli.clone())
                } else if self.library.is_available() {
                    tracing::info!("7z not available, falling back to the zip library");
                    Ok(self.library.clone())
                } else {
                    Err(Error::NoStrategyAvailable)
                }
            }
        }
    }

    /// `(cli, library)` availability, for diagnostics.
    pub fn availability(&self) -> (bool, bool) {
        (self.cli.is_available(), self.library.is_available())
    }

    fn require(&self, creator: &Arc<dyn ZipCreator>, reason: &str) -> Result<Arc<dyn ZipCreator>> {
        if creator.is_available() {
            Ok(creator.clone())
        } else {
            Err(Error::StrategyUnavailable(creator.strategy(), reason.to_string()))
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::backup::archive::{ArchiveRequest, ZipCreator, ZipStrategy};
    use crate::backup::result_error::result::Result;

    /// A strategy whose availability is fixed and which never writes anything.
    #[derive(Debug)]
    pub(crate) struct FakeZipCreator {
        pub(crate) strategy: ZipStrategy,
        pub(crate) available: bool,
    }

    impl ZipCreator for FakeZipCreator {
        fn strategy(&self) -> ZipStrategy {
            self.strategy
        }

        fn is_available(&self) -> bool {
            self.available
        }

        fn create(&self, _request: &ArchiveRequest) -> Result<usize> {
            Ok(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeZipCreator;
    use super::*;

    fn manager(cli: bool, library: bool) -> ZipManager {
        ZipManager::new(
            Arc::new(FakeZipCreator {
                strategy: ZipStrategy::Cli,
                available: cli,
            }),
            Arc::new(FakeZipCreator {
                strategy: ZipStrategy::Library,
                available: library,
            }),
        )
    }

    #[test]
    fn test_auto_prefers_cli() {
        let resolved = manager(true, true).resolve(ZipStrategy::Auto).unwrap();
        assert_eq!(resolved.strategy(), ZipStrategy::Cli);
    }

    #[test]
    fn test_auto_falls_back_to_library() {
        let resolved = manager(false, true).resolve(ZipStrategy::Auto).unwrap();
        assert_eq!(resolved.strategy(), ZipStrategy::Library);
    }

    #[test]
    fn test_auto_fails_without_any_strategy() {
        let err = manager(false, false).resolve(ZipStrategy::Auto).unwrap_err();
        assert!(matches!(err, Error::NoStrategyAvailable));
    }

    #[test]
    fn test_explicit_preference_is_honoured() {
        let resolved = manager(true, true).resolve(ZipStrategy::Library).unwrap();
        assert_eq!(resolved.strategy(), ZipStrategy::Library);

        let resolved = manager(true, false).resolve(ZipStrategy::Cli).unwrap();
        assert_eq!(resolved.strategy(), ZipStrategy::Cli);
    }

    #[test]
    fn test_explicit_preference_does_not_fall_back() {
        let err = manager(false, true).resolve(ZipStrategy::Cli).unwrap_err();
        assert!(matches!(err, Error::StrategyUnavailable(ZipStrategy::Cli, _)));

        let err = manager(true, false).resolve(ZipStrategy::Library).unwrap_err();
        assert!(matches!(err, Error::StrategyUnavailable(ZipStrategy::Library, _)));
    }

    #[test]
    fn test_availability() {
        assert_eq!(manager(false, true).availability(), (false, true));
    }
}
