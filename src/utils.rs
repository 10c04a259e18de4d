//! # Utility Functions Module
//!
//! Piccole utility per ridurre il boilerplate, usate soprattutto per
//! costruire la riga di comando dell'engine lanciato dal driver.

/// Builds an argument vector from heterogeneous displayable values.
///
/// ```rust
/// let quality = 75;
/// let args = towebp::args!["-q", quality];
/// assert_eq!(args, ["-q", "75"]);
/// ```
#[macro_export]
macro_rules! args {
    [$($item:expr),* $(,)?] => {
        vec![$($item.to_string()),*]
    };
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_args_macro_mixed_types() {
        let quality: u8 = 60;
        let result = args!["-q", quality, "-r"];
        assert_eq!(result, vec!["-q", "60", "-r"]);
    }

    #[test]
    fn test_args_macro_trailing_comma() {
        let result: Vec<String> = args!["-r",];
        assert_eq!(result, vec!["-r"]);
    }
}
