use super::*;
use std::io;

mod output {
    use super::*;

    #[test]
    fn captures_stdout() -> anyhow::Result<()> {
        let stdout = output("echo", &["hello", "world"])?;
        assert_eq!("hello world\n", stdout);
        Ok(())
    }

    #[test]
    fn failure_includes_stderr() {
        let error = output("bash", &["-c", "echo nope >&2; exit 3"]).unwrap_err();
        let message = error.to_string();
        assert!(message.contains("command exited with exit code 3"));
        assert!(message.contains("nope"));
    }

    #[test]
    fn empty_cmd_or_failure_to_start() {
        let error = output("", &["a", "b", "c"]).unwrap_err();
        assert!(error
            .to_string()
            .contains("failed to start command: '' a b c"));
        let error: io::Error = error.downcast().unwrap();
        assert_eq!(io::ErrorKind::NotFound, error.kind());
    }

    #[test]
    fn empty_args() -> anyhow::Result<()> {
        assert_eq!("\n", output::<&str, &str>("echo", &[])?);
        Ok(())
    }

    #[test]
    fn exit_failure() {
        let error = output("bash", &["-c", "false"]).unwrap_err();
        assert!(error
            .to_string()
            .contains("command exited with exit code 1: bash -c false"));
    }

    #[test]
    fn quotes_arguments_in_errors() {
        let error = output("bash", &["-c", "exit 1", "two words"]).unwrap_err();
        assert!(error
            .to_string()
            .contains("bash -c 'exit 1' 'two words'"));
    }
}
