//! Default port implementations backed by the filesystem, `git`, HTTP and
//! child processes.

mod diffoscope;
mod fs;
mod git;
mod origin;
mod toolchain;

pub use diffoscope::{DIFFOSCOPE_IMAGE, Diffoscope};
pub use fs::FsWritePort;
pub use git::ShellGit;
pub use origin::{HttpOrigin, MirrorOrigin};
pub use toolchain::{MakeToolchain, Step, make_steps};
