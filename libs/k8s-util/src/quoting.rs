//! Shell-quoting for pool-mode task templates, which hand the entrypoint to
//! `/bin/sh -c` as a single string rather than an argv array.

use shlex::try_quote;

/// Builds the `/bin/sh -c "... &"` command line a pool task template runs,
/// backgrounding the quoted entrypoint behind the bootstrap script.
pub fn build_pool_command(entrypoint: &[String]) -> String {
    let quoted = quote_entrypoint(entrypoint);
    format!("/opt/opensandbox/bin/bootstrap.sh {quoted} &")
}

/// Shell-quotes each entrypoint element and joins them with spaces.
/// Falls back to a literal `''` for elements `shlex` can't represent
/// (interior NUL bytes), which can't occur in practice since the
/// entrypoint arrives as validated UTF-8 strings.
pub fn quote_entrypoint(entrypoint: &[String]) -> String {
    entrypoint
        .iter()
        .map(|arg| try_quote(arg).map(|c| c.into_owned()).unwrap_or_else(|_| "''".to_string()))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_arguments_with_spaces() {
        let entrypoint = vec![
            "python".to_string(),
            "-c".to_string(),
            "print('hi')".to_string(),
        ];
        let quoted = quote_entrypoint(&entrypoint);
        let parts: Vec<&str> = quoted.splitn(3, ' ').collect();
        assert_eq!(parts[0], "python");
        assert_eq!(parts[1], "-c");
        assert!(parts[2].contains("print"));
    }

    #[test]
    fn plain_arguments_are_unquoted() {
        let entrypoint = vec!["echo".to_string(), "hello".to_string()];
        assert_eq!(quote_entrypoint(&entrypoint), "echo hello");
    }

    #[test]
    fn pool_command_backgrounds_the_entrypoint() {
        let entrypoint = vec!["run.sh".to_string()];
        assert_eq!(
            build_pool_command(&entrypoint),
            "/opt/opensandbox/bin/bootstrap.sh run.sh &"
        );
    }
}
