pub use chrono;
pub use indoc;
pub use log;
pub use pathdiff;
pub use serde_json;
pub use serde_yaml;
pub use thiserror;
pub use uuid;
pub use walkdir;

/// Name of the function this macro is called in
#[macro_export]
macro_rules! function_name {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            std::any::type_name::<T>()
        }
        let name = type_name_of(f);
        &name[..name.len() - 3]
    }};
}

/// Returns `true` when the path ends with the given extension. The comparison ignores the case.
pub fn has_extension(path: impl AsRef<std::path::Path>, extension: &str) -> bool {
    path.as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(extension))
        .unwrap_or(false)
}
