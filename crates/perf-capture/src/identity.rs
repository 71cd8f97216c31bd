//! Which test is running.
//!
//! Records are named after the test that produced them and stored next to
//! its source file. [`TestDetails`] carries that identity; a
//! [`CurrentTest`] provider hands it to the capture context on demand.

use std::path::{Path, PathBuf};

use crate::error::CaptureError;

/// Identity of a test function.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TestDetails {
    /// Source file holding the test.
    pub file_path: PathBuf,
    /// Grouping the test belongs to, if any. For Rust tests this is the
    /// module enclosing the test function.
    pub class_name: Option<String>,
    pub test_name: String,
}

impl TestDetails {
    pub fn new(
        file_path: impl Into<PathBuf>,
        class_name: Option<&str>,
        test_name: impl Into<String>,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            class_name: class_name.map(str::to_string),
            test_name: test_name.into(),
        }
    }

    /// `Class.test`, or just `test` without a class.
    #[must_use]
    pub fn base_record_name(&self) -> String {
        match &self.class_name {
            Some(class) => format!("{class}.{}", self.test_name),
            None => self.test_name.clone(),
        }
    }

    /// Build an identity from a function path as given by
    /// [`std::any::type_name`], the `file!()` of the call site, and the
    /// crate's manifest directory.
    ///
    /// Trailing `{{closure}}` segments and the probe function name `f` are
    /// dropped. The last remaining segment is the test name; the one before
    /// it is the class, unless it is the crate root.
    ///
    /// # Errors
    ///
    /// Returns `CaptureError::TestIdentity` when no test name is left.
    pub fn from_fn_path(
        file: &str,
        fn_path: &str,
        manifest_dir: &str,
    ) -> Result<Self, CaptureError> {
        let mut segments: Vec<&str> = fn_path.split("::").collect();
        if segments.last() == Some(&"f") {
            segments.pop();
        }
        while segments.last() == Some(&"{{closure}}") {
            segments.pop();
        }

        let Some(test_name) = segments.pop() else {
            return Err(CaptureError::TestIdentity(format!(
                "no function name in '{fn_path}'"
            )));
        };
        if test_name.is_empty() {
            return Err(CaptureError::TestIdentity(format!(
                "no function name in '{fn_path}'"
            )));
        }
        // What remains is the crate root followed by modules.
        let class_name = if segments.len() > 1 {
            segments.last().copied()
        } else {
            None
        };

        Ok(Self::new(
            resolve_source_file(file, Path::new(manifest_dir)),
            class_name,
            test_name,
        ))
    }
}

/// `file!()` is relative to the workspace root, which may sit above the
/// crate's manifest directory.
fn resolve_source_file(file: &str, manifest_dir: &Path) -> PathBuf {
    let file = Path::new(file);
    if file.is_absolute() {
        return file.to_path_buf();
    }
    manifest_dir
        .ancestors()
        .map(|dir| dir.join(file))
        .find(|candidate| candidate.exists())
        .unwrap_or_else(|| manifest_dir.join(file))
}

/// Supplies the identity of the running test.
pub trait CurrentTest: Send + Sync {
    /// # Errors
    ///
    /// Returns `CaptureError::TestIdentity` if no test is running.
    fn current_test(&self) -> Result<TestDetails, CaptureError>;
}

impl CurrentTest for TestDetails {
    fn current_test(&self) -> Result<TestDetails, CaptureError> {
        Ok(self.clone())
    }
}

impl<F> CurrentTest for F
where
    F: Fn() -> Result<TestDetails, CaptureError> + Send + Sync,
{
    fn current_test(&self) -> Result<TestDetails, CaptureError> {
        self()
    }
}

/// The [`TestDetails`] of the enclosing function.
///
/// ```
/// fn test_listing() {
///     let test = perf_capture::current_test!().unwrap();
///     assert_eq!(test.test_name, "test_listing");
/// }
/// # test_listing();
/// ```
#[macro_export]
macro_rules! current_test {
    () => {{
        fn f() {}
        $crate::TestDetails::from_fn_path(
            file!(),
            ::std::any::type_name_of_val(&f),
            env!("CARGO_MANIFEST_DIR"),
        )
    }};
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::top_level("my_crate::test_it::f", None, "test_it")]
    #[case::in_module("my_crate::tests::test_it::f", Some("tests"), "test_it")]
    #[case::nested("my_crate::a::b::test_it::f", Some("b"), "test_it")]
    #[case::closure("my_crate::tests::test_it::{{closure}}::f", Some("tests"), "test_it")]
    #[case::no_probe("my_crate::tests::test_it", Some("tests"), "test_it")]
    fn parses_function_paths(
        #[case] fn_path: &str,
        #[case] class: Option<&str>,
        #[case] test: &str,
    ) {
        let details = TestDetails::from_fn_path("/abs/tests/x.rs", fn_path, "/abs").unwrap();
        assert_eq!(details.class_name.as_deref(), class);
        assert_eq!(details.test_name, test);
        assert_eq!(details.file_path, PathBuf::from("/abs/tests/x.rs"));
    }

    #[test]
    fn empty_path_is_an_error() {
        let err = TestDetails::from_fn_path("x.rs", "", "/abs").unwrap_err();
        assert!(matches!(err, CaptureError::TestIdentity(_)));
    }

    #[test]
    fn base_record_name() {
        assert_eq!(
            TestDetails::new("t.rs", Some("Suite"), "test_a").base_record_name(),
            "Suite.test_a"
        );
        assert_eq!(TestDetails::new("t.rs", None, "test_a").base_record_name(), "test_a");
    }

    #[test]
    fn macro_finds_this_test() {
        let details = crate::current_test!().unwrap();
        assert_eq!(details.test_name, "macro_finds_this_test");
        assert_eq!(details.class_name.as_deref(), Some("tests"));
        assert!(details.file_path.ends_with("src/identity.rs"));
        assert!(details.file_path.exists());
    }
}
