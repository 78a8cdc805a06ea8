use goblin::Hint;
use log::debug;
use std::io::Read;
use std::path::Path;

use crate::error::InstallError;
use crate::package::{VerifyCheck, VerifyKind};
use crate::runtime::Runtime;

/// Step name reported when a post-install check fails.
pub const VERIFY_STEP: &str = "verify";

/// Check the installed tree against the descriptor's expectations.
#[tracing::instrument(skip(runtime, checks))]
pub fn verify_install<R: Runtime>(
    runtime: &R,
    prefix: &Path,
    checks: &[VerifyCheck],
) -> Result<(), InstallError> {
    for check in checks {
        let path = prefix.join(&check.path);
        let problem = match check.kind {
            VerifyKind::Dir if !runtime.is_dir(&path) => Some("is not a directory"),
            VerifyKind::File if !runtime.exists(&path) || runtime.is_dir(&path) => {
                Some("is not a file")
            }
            VerifyKind::Executable if !runtime.is_executable(&path) => Some("is not executable"),
            VerifyKind::Executable if !is_program(runtime, &path) => {
                Some("is neither a script nor a native program")
            }
            _ => None,
        };
        if let Some(problem) = problem {
            return Err(InstallError::build(
                VERIFY_STEP,
                format!("{} {}", path.display(), problem),
            ));
        }
        debug!("Verified {:?}", path);
    }
    Ok(())
}

/// Leading bytes needed to recognise a script or an object file format.
const MAGIC_LEN: usize = 16;

/// A `#!` script or an ELF/Mach-O object, judged from its first bytes.
fn is_program<R: Runtime>(runtime: &R, path: &Path) -> bool {
    let mut header = Vec::with_capacity(MAGIC_LEN);
    let read = runtime
        .open(path)
        .and_then(|file| Ok(file.take(MAGIC_LEN as u64).read_to_end(&mut header)?));
    if let Err(e) = read {
        debug!("Cannot read header of {:?}: {:#}", path, e);
        return false;
    }
    if header.starts_with(b"#!") {
        return true;
    }
    let Ok(magic) = <&[u8; MAGIC_LEN]>::try_from(header.as_slice()) else {
        return false;
    };
    matches!(
        goblin::peek_bytes(magic),
        Ok(Hint::Elf(_) | Hint::Mach(_) | Hint::MachFat(_))
    )
}
