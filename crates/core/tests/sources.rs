use std::path::{Path, PathBuf};

use rzview::{ArchSpec, CodeHost, Perm, SessionError, Source};

struct Host {
    code: Option<Vec<u8>>,
    path: Option<PathBuf>,
}

impl CodeHost for Host {
    fn code(&self) -> Option<&[u8]> {
        self.code.as_deref()
    }

    fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

#[test]
fn arch_names_drop_bit_width_suffix() {
    assert_eq!(ArchSpec::new("arm64", 64).engine_name(), "arm");
    assert_eq!(ArchSpec::new("X8664", 64).engine_name(), "x86");
    assert_eq!(ArchSpec::new("x86_64", 64).engine_name(), "x86");
    assert_eq!(ArchSpec::new("riscv64", 64).engine_name(), "riscv");
    assert_eq!(ArchSpec::new("mips", 32).engine_name(), "mips");
    assert_eq!(ArchSpec::new("x86", 32).engine_name(), "x86");
    assert_eq!(ArchSpec::new("64", 64).engine_name(), "64");
}

#[test]
fn host_code_wins_over_path() {
    let host = Host { code: Some(vec![0x90]), path: Some("/bin/true".into()) };
    assert_eq!(Source::from_host(&host).unwrap(), Source::Bytes(vec![0x90]));

    let host = Host { code: Some(vec![]), path: Some("/bin/true".into()) };
    assert_eq!(Source::from_host(&host).unwrap(), Source::Path("/bin/true".into()));
}

#[test]
fn host_without_code_or_path_is_unsupported() {
    let host = Host { code: None, path: None };
    let err = Source::from_host(&host).unwrap_err();
    assert!(matches!(err, SessionError::UnsupportedSource(_)));
}

#[test]
fn open_parts_for_each_source() {
    let (uri, perm) = Source::from(vec![1u8, 2, 3]).open_parts().unwrap();
    assert_eq!(uri, "malloc://3");
    assert_eq!(perm, Perm::all());

    let err = Source::Bytes(Vec::new()).open_parts().unwrap_err();
    assert!(matches!(err, SessionError::UnsupportedSource(_)));

    let err = Source::from("definitely/not/here.bin").open_parts().unwrap_err();
    assert!(matches!(err, SessionError::MissingBinary(_)));

    let temp = tempfile::tempdir().unwrap();
    let bin = temp.path().join("bin");
    std::fs::write(&bin, b"\x7fELF").unwrap();
    let (uri, perm) = Source::from(bin.as_path()).open_parts().unwrap();
    assert_eq!(uri, bin.display().to_string());
    assert_eq!(perm, Perm::READ | Perm::EXEC);
}
