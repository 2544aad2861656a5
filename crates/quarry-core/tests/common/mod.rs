#![allow(missing_docs)]

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use chrono::{TimeZone, Utc};
use quarry_core::archive::write_archive;
use quarry_schema::compress::gunzip;
use quarry_schema::tuple::decode_list;
use quarry_schema::{Dependency, DependencyKind, SpecTuple, Specification, Version};
use tempfile::TempDir;

/// Temporary archive and index directories.
pub struct TestRepo {
    _temp_dir: TempDir,
    pub archives: PathBuf,
    pub index: PathBuf,
}

impl TestRepo {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let archives = temp_dir.path().join("gems");
        let index = temp_dir.path().join("index");
        std::fs::create_dir_all(&archives).expect("failed to create archive dir");
        Self {
            _temp_dir: temp_dir,
            archives,
            index,
        }
    }

    /// Write a valid archive and return its path.
    pub fn add(&self, name: &str, version: &str, platform: Option<&str>) -> PathBuf {
        write_archive(&self.archives, &spec(name, version, platform), &[("data.tar.gz", b"payload")], true)
            .expect("failed to write archive")
    }

    /// Write an archive whose metadata is not a descriptor.
    pub fn add_corrupt(&self, file_name: &str) -> PathBuf {
        let path = self.archives.join(file_name);
        let mut builder = tar::Builder::new(std::fs::File::create(&path).unwrap());
        let body = b"--- !ruby/object:Gem::Specification\nname: [unterminated";
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, "metadata", &body[..]).unwrap();
        builder.into_inner().unwrap();
        path
    }

    /// Write an archive whose metadata header declares an absurd size.
    pub fn add_oversized(&self, file_name: &str) -> PathBuf {
        let path = self.archives.join(file_name);
        let mut header = tar::Header::new_gnu();
        header.set_path("metadata").unwrap();
        header.set_size(1 << 44);
        header.set_mode(0o644);
        header.set_cksum();
        let mut bytes = header.as_bytes().to_vec();
        bytes.extend_from_slice(&[0u8; 1024]);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    pub fn aggregate(&self, file_name: &str) -> Vec<SpecTuple> {
        read_aggregate(&self.index.join(file_name))
    }
}

pub fn spec(name: &str, version: &str, platform: Option<&str>) -> Specification {
    Specification::builder(name, Version::parse(version).unwrap())
        .unwrap()
        .platform(platform)
        .unwrap()
        .summary(format!("{name} test package"))
        .author("Quarry Tests")
        .license("MIT")
        .date(Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap())
        .dependency(Dependency::new("rake", ">= 12", DependencyKind::Development))
        .files(vec![format!("lib/{name}.rb")])
        .build()
}

pub fn read_aggregate(path: &Path) -> Vec<SpecTuple> {
    let bytes = std::fs::read(path).expect("aggregate missing");
    decode_list(&gunzip(&bytes).unwrap()).unwrap()
}

pub fn basenames(tuples: &[SpecTuple]) -> Vec<String> {
    tuples.iter().map(SpecTuple::basename).collect()
}
