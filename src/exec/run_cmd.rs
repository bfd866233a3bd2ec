use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;

use anyhow::{Context, Result};

use crate::fs::Fs;

use super::Error;

/// Captured result of a short command such as `qsub` or `qstat`.
#[derive(Debug)]
pub struct CmdOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Build a `Command` from a configured command line such as `"qsub -V"`.
pub fn command_line(line: &str) -> Result<Command, Error> {
    let mut words = line.split_whitespace();
    let program = words.next().ok_or(Error::EmptyCommand)?;
    let mut cmd = Command::new(program);
    cmd.args(words);
    Ok(cmd)
}

/// Run a command to completion and capture its output.
pub fn capture(cmd: &mut Command) -> Result<CmdOutput> {
    log::debug!("running {:?} {:?}", cmd.get_program(), cmd.get_args().collect::<Vec<_>>());
    let output = cmd
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("failed to execute {:?}", cmd.get_program()))?;
    Ok(CmdOutput {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Run a subprocess, storing stdout and stderr in the given files.
/// Output is echoed to our own stderr when `verbose` is set.
/// Based on:
/// <https://stackoverflow.com/questions/66060139/how-to-tee-stdout-stderr-from-a-subprocess-in-rust>
pub fn run_cmd(
    cmd: &mut Command,
    out_path: &Path,
    err_path: &Path,
    fs: &Fs,
    verbose: bool,
) -> Result<bool> {
    let out_file = fs.create_file(out_path).context("creating stdout file")?;
    let err_file = fs.create_file(err_path).context("creating stderr file")?;

    log::debug!("running {:?} {:?}", cmd.get_program(), cmd.get_args().collect::<Vec<_>>());
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| {
            format!(
                "failed to execute child process {:?} {:?}",
                cmd.get_program(),
                cmd.get_args().collect::<Vec<_>>(),
            )
        })?;

    let child_out = child.stdout.take().ok_or(Error::NoChildPipe)?;
    let child_err = child.stderr.take().ok_or(Error::NoChildPipe)?;

    let thread_out = thread::spawn(move || communicate(child_out, out_file, echo(verbose)));
    let thread_err = thread::spawn(move || communicate(child_err, err_file, echo(verbose)));

    let joined_out = thread_out.join().map_err(|_| Error::Communicate)?;
    let joined_err = thread_err.join().map_err(|_| Error::Communicate)?;
    joined_out.context("communicating with child stdout")?;
    joined_err.context("communicating with child stderr")?;

    let status = child.wait().context("failed to wait on child process")?;
    log::debug!("process finished with {status}");
    Ok(status.success())
}

fn echo(verbose: bool) -> Box<dyn Write + Send> {
    if verbose {
        Box::new(io::stderr())
    } else {
        Box::new(io::sink())
    }
}

fn communicate<R: Read, W: Write>(mut stream: R, mut file: File, mut output: W) -> io::Result<()> {
    let mut buf = [0u8; 1024];
    loop {
        let num_read = stream.read(&mut buf)?;
        if num_read == 0 {
            break;
        }

        let buf = &buf[..num_read];
        file.write_all(buf)?;
        output.write_all(buf)?;
    }

    Ok(())
}
