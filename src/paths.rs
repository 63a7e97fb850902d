use std::{path::PathBuf, sync::LazyLock};

pub static DEFAULT_OPTI_PATH: LazyLock<PathBuf> = LazyLock::new(|| {
    if let Some(custom) = std::env::var_os("OPTINSTALLER_HOME") {
        return PathBuf::from(custom);
    }

    let mut path = dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_default();
    path.push("Optinstaller");
    path
});

/// Computes a path inside the Optinstaller data directory.
///
/// Returns a `&Path` referencing the data directory itself if no arguments are passed in, or a
/// `PathBuf` created by joining all of the arguments to the base directory if at least one
/// argument is passed in.
///
/// # Examples
///
/// ```ignore
/// // With OPTINSTALLER_HOME unset the base is <data dir>/Optinstaller
/// let versions = opti_path!("Versions");
/// let slot = opti_path!("Versions", "v0.7.9");
/// ```
#[macro_export]
macro_rules! opti_path {
    () => {
        $crate::paths::DEFAULT_OPTI_PATH.as_path()
    };

    ( $( $path:expr ),+ $(,)? ) => {
        [
            $crate::paths::DEFAULT_OPTI_PATH.as_path(),
            $( std::path::Path::new(&$path) ),+
        ].into_iter().collect::<std::path::PathBuf>()
    };
}
