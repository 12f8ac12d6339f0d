/*
This file is part of the Connectivity Preprocessing Toolkit
Copyright (C) 2025 the Connectivity Preprocessing Toolkit authors

The Connectivity Preprocessing Toolkit is free software: you can redistribute it and/or modify
it under the terms of the GNU General Public License as published by
the Free Software Foundation, either version 3 of the License, or
(at your option) any later version.

This program is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
GNU General Public License for more details.

You should have received a copy of the GNU General Public License
along with this program.  If not, see <http://www.gnu.org/licenses/>.
*/

//! The external process collaborator.  Shelling out to the GDAL/OGR command
//! line tools (and osmtogeojson) is the only blocking boundary of the
//! pipeline, so every invocation goes through one explicit value type that
//! captures command, arguments, output and exit code.

use std::path::Path;
use std::process::Command;

use anyhow::{bail, Context, Result};
use log::{debug, warn};

#[derive(Debug, Clone)]
pub struct ExternalCommand {
    program: String,
    args: Vec<String>,
}

#[derive(Debug)]
pub struct CommandOutput {
    pub status_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status_code == Some(0)
    }
}

impl ExternalCommand {
    pub fn new(program: &str) -> Self {
        ExternalCommand {
            program: program.to_string(),
            args: Vec::new(),
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where I: IntoIterator<Item = S>,
          S: Into<String>
    {
        self.args.extend(args.into_iter().map(|a| a.into()));
        self
    }

    pub fn arg_path(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy().to_string())
    }

    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    /// Runs to completion and captures output.  Fails on spawn problems only;
    /// the caller inspects the exit code.
    pub fn run_unchecked(&self) -> Result<CommandOutput> {
        debug!("Running: {}", self.command_line());

        let output = Command::new(&self.program)
            .args(&self.args)
            .output()
            .with_context(|| format!("Failed to run '{}'. Is it installed?", self.program))?;

        Ok(CommandOutput {
            status_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Runs to completion, failing on a non-zero exit with the captured
    /// stderr in the error.  A successful run with stderr output warns.
    pub fn run(&self) -> Result<CommandOutput> {
        let output = self.run_unchecked()?;

        if !output.success() {
            bail!("'{}' exited with {:?}:\n{}",
                  self.command_line(), output.status_code, output.stderr.trim());
        }

        if !output.stderr.is_empty() {
            warn!("'{}' warnings:\n{}", self.program, output.stderr.trim());
        }

        Ok(output)
    }
}

/// Runs a shell script with bash.  A syntax error is retried once after a
/// dos2unix pass, covering scripts saved with Windows line endings.
pub fn run_shell_script(script_path: &Path) -> Result<()> {
    let run = || ExternalCommand::new("bash").arg_path(script_path).run_unchecked();

    let output = run()?;
    if output.success() {
        return Ok(());
    }

    if output.stderr.contains("syntax error") {
        warn!("Syntax error in {:?}, converting line endings and retrying", script_path);
        ExternalCommand::new("dos2unix").arg_path(script_path).run()?;

        let retried = run()?;
        if retried.success() {
            return Ok(());
        }
        bail!("Script {:?} failed after dos2unix retry:\n{}",
              script_path, retried.stderr.trim());
    }

    bail!("Script {:?} exited with {:?}:\n{}",
          script_path, output.status_code, output.stderr.trim())
}

#[cfg(test)]
mod ext_tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_run_captures_stdout() {
        let output = ExternalCommand::new("echo")
            .arg("hello")
            .run()
            .unwrap();

        assert!(output.success());
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[test]
    fn test_run_fails_on_nonzero_exit() {
        let result = ExternalCommand::new("false").run();
        assert!(result.is_err());
    }

    #[test]
    fn test_run_unchecked_keeps_nonzero_exit() {
        let output = ExternalCommand::new("false").run_unchecked().unwrap();
        assert!(!output.success());
        assert_eq!(output.status_code, Some(1));
    }

    #[test]
    fn test_missing_program_is_an_error() {
        let result = ExternalCommand::new("definitely-not-a-real-binary-xyz").run_unchecked();
        assert!(result.is_err());
    }

    #[test]
    fn test_command_line() {
        let cmd = ExternalCommand::new("ogr2ogr")
            .args(["-f", "GPKG"])
            .arg("out.gpkg");

        assert_eq!(cmd.command_line(), "ogr2ogr -f GPKG out.gpkg");
    }

    #[test]
    fn test_run_shell_script() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"#!/bin/bash\nexit 0\n").unwrap();
        file.flush().unwrap();

        run_shell_script(file.path()).unwrap();
    }

    #[test]
    fn test_run_shell_script_failure() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"#!/bin/bash\nexit 3\n").unwrap();
        file.flush().unwrap();

        assert!(run_shell_script(file.path()).is_err());
    }
}
