/// Native module contains implementations of the interpreter traits
/// that run programs with toolchains installed on the host,
/// spawning them as child processes of the worker thread.
pub mod script;
pub mod toolchain;
