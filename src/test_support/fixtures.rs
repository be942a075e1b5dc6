//! Project trees and Kraftfiles for tests.

use std::path::{Path, PathBuf};

use super::write_file;

/// Unikraft project with the core, one library and two targets.
pub const UNIKRAFT_KRAFTFILE: &str = r#"spec: v0.6
name: helloworld
unikraft: stable
libraries:
  musl: stable
targets:
  - qemu/x86_64
  - fc/arm64
"#;

/// Project built from a prebuilt runtime and a rootfs directory.
pub const RUNTIME_KRAFTFILE: &str = r#"spec: v0.6
name: nginx
runtime: nginx:1.25
rootfs: ./rootfs
cmd: ["/usr/bin/nginx", "-c", "/etc/nginx/nginx.conf"]
targets:
  - qemu/x86_64
"#;

/// Write a Kraftfile into `dir`, creating it first.
pub fn write_kraftfile(dir: &Path, contents: &str) -> PathBuf {
    let path = dir.join("Kraftfile");
    write_file(&path, contents);
    path
}

/// Make `dir` look like a fetched component.
pub fn materialize(dir: &Path) {
    write_file(&dir.join("Makefile.uk"), "# fetched\n");
}

/// A small root filesystem under `<dir>/rootfs`.
pub fn rootfs_tree(dir: &Path) -> PathBuf {
    let root = dir.join("rootfs");
    write_file(&root.join("etc/hostname"), "unikernel\n");
    write_file(&root.join("usr/bin/app"), "#!/bin/sh\necho hi\n");
    std::fs::create_dir_all(root.join("tmp")).unwrap();
    root
}
