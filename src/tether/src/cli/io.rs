use std::path::{Path, PathBuf};

use clap::Args;
use glob::glob;

use crate::cli::HYPHEN;

/// Generalized command options for accepting many input files.
#[derive(Debug, Args)]
pub struct Inputs {
    /// Specifies the input files to process.
    ///
    /// UNIX glob patterns are supported to specify many files. Every
    /// pattern must match at least one file.
    #[clap(required = true)]
    pub inputs: Vec<String>,
}

impl Inputs {
    /// Expands the given patterns into the list of input paths.
    ///
    /// Paths are kept in the order the patterns were given.
    pub fn evaluate(self) -> eyre::Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for pattern in &self.inputs {
            let matched: Vec<PathBuf> = glob(pattern)?.collect::<Result<_, _>>()?;
            if matched.is_empty() {
                return Err(eyre::eyre!("failed to find files matching '{pattern}'"));
            }

            paths.extend(matched);
        }

        Ok(paths)
    }
}

/// Interprets an output path argument, where a hyphen means stdout.
#[inline]
pub fn output_path(path: &Path) -> Option<&Path> {
    (path.as_os_str() != HYPHEN).then_some(path)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn test_output_path() {
        assert_eq!(output_path(Path::new("-")), None);
        assert_eq!(
            output_path(Path::new("out.json")),
            Some(Path::new("out.json"))
        );
    }

    #[test]
    fn test_patterns_expand_in_order() {
        let dir = std::env::temp_dir().join(format!("tether-inputs-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        for name in ["a.txt", "b.txt", "c.log"] {
            fs::write(dir.join(name), "1\n").unwrap();
        }

        let inputs = Inputs {
            inputs: vec![
                dir.join("*.log").display().to_string(),
                dir.join("*.txt").display().to_string(),
            ],
        };
        let paths = inputs.evaluate().unwrap();
        assert_eq!(
            paths,
            [dir.join("c.log"), dir.join("a.txt"), dir.join("b.txt")]
        );

        let missing = Inputs {
            inputs: vec![dir.join("*.bin").display().to_string()],
        };
        assert!(missing.evaluate().is_err());

        fs::remove_dir_all(&dir).unwrap();
    }
}
