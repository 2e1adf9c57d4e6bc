//! A host directory standing in for the SD card's root directory.

use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use datasock_core::storage::{OpenMode, Volume};
use log::debug;

pub struct HostDirVolume {
    root: PathBuf,
    attached: bool,
}

impl HostDirVolume {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            attached: false,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, name: &str) -> io::Result<PathBuf> {
        if !self.attached {
            return Err(io::Error::new(ErrorKind::NotConnected, "volume not attached"));
        }
        // Only the flat root directory exists on the card
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                format!("not a root file name: {name:?}"),
            ));
        }
        Ok(self.root.join(name))
    }

    fn check_attached(&self) -> io::Result<()> {
        if self.attached {
            Ok(())
        } else {
            Err(io::Error::new(ErrorKind::NotConnected, "volume not attached"))
        }
    }
}

impl Volume for HostDirVolume {
    type File = File;
    type Error = io::Error;

    fn attach(&mut self) -> io::Result<()> {
        let metadata = fs::metadata(&self.root)?;
        if !metadata.is_dir() {
            return Err(io::Error::new(
                ErrorKind::NotADirectory,
                format!("{} is not a directory", self.root.display()),
            ));
        }
        self.attached = true;
        debug!("Attached {}", self.root.display());
        Ok(())
    }

    fn is_attached(&self) -> bool {
        self.attached
    }

    fn detach(&mut self) {
        self.attached = false;
    }

    fn open(&mut self, name: &str, mode: OpenMode) -> io::Result<File> {
        let path = self.path(name)?;
        match mode {
            OpenMode::Read => File::open(path),
            OpenMode::Append => OpenOptions::new().append(true).create(true).open(path),
            OpenMode::Truncate => File::create(path),
        }
    }

    fn read(&mut self, file: &mut File, buf: &mut [u8]) -> io::Result<usize> {
        self.check_attached()?;
        file.read(buf)
    }

    fn write(&mut self, file: &mut File, data: &[u8]) -> io::Result<usize> {
        self.check_attached()?;
        file.write(data)
    }

    fn flush(&mut self, file: &mut File) -> io::Result<()> {
        self.check_attached()?;
        file.sync_data()
    }

    fn close(&mut self, file: File) -> io::Result<()> {
        file.sync_all()
    }

    fn for_each_file(&mut self, visit: &mut dyn FnMut(&str)) -> io::Result<()> {
        self.check_attached()?;
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                visit(name);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datasock_core::clock::ManualClock;
    use datasock_core::config::{ConfigStore, SharedConfig};
    use datasock_core::storage::{BucketRange, LogStore};

    fn attached(dir: &Path) -> HostDirVolume {
        let mut volume = HostDirVolume::new(dir);
        volume.attach().unwrap();
        volume
    }

    #[test]
    fn test_attach_requires_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut missing = HostDirVolume::new(dir.path().join("card"));
        assert!(missing.attach().is_err());
        assert!(!missing.is_attached());

        fs::create_dir(dir.path().join("card")).unwrap();
        missing.attach().unwrap();
        assert!(missing.is_attached());
    }

    #[test]
    fn test_append_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut volume = attached(dir.path());

        for chunk in [&b"one\r\n"[..], b"two\r\n"] {
            let mut file = volume.open("log.csv", OpenMode::Append).unwrap();
            assert_eq!(volume.write(&mut file, chunk).unwrap(), chunk.len());
            volume.flush(&mut file).unwrap();
            volume.close(file).unwrap();
        }

        let mut file = volume.open("log.csv", OpenMode::Read).unwrap();
        let mut buf = [0u8; 32];
        let n = volume.read(&mut file, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"one\r\ntwo\r\n");
        assert_eq!(volume.read(&mut file, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_lists_only_root_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("config.txt"), "device_name=Sock\n").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        let mut volume = attached(dir.path());

        let mut names = Vec::new();
        volume
            .for_each_file(&mut |name| names.push(name.to_owned()))
            .unwrap();
        assert_eq!(names, ["config.txt"]);
        assert!(volume.exists("config.txt").unwrap());
        assert!(!volume.exists("nested").unwrap());
    }

    #[test]
    fn test_detached_volume_refuses_io() {
        let dir = tempfile::tempdir().unwrap();
        let mut volume = attached(dir.path());
        let mut file = volume.open("a.csv", OpenMode::Append).unwrap();
        volume.detach();

        let err = volume.write(&mut file, b"x").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotConnected);
        assert!(volume.open("a.csv", OpenMode::Read).is_err());
        assert!(volume.open("../escape", OpenMode::Append).is_err());
    }

    #[test]
    fn test_log_store_over_host_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = SharedConfig::default();
        let clock = ManualClock::new(7_200, 0);
        let mut store = LogStore::new(HostDirVolume::new(dir.path()), &clock, &config);

        store.append(b"7200.000,0,0,0,0,0,0,20.00,1\r\n").unwrap();
        store.close_files();

        let written = fs::read_to_string(dir.path().join("DataSock_1970-01-01_02.csv")).unwrap();
        assert_eq!(written, "7200.000,0,0,0,0,0,0,20.00,1\r\n");
        assert_eq!(store.list_buckets(BucketRange::All).unwrap(), [7_200]);

        let sample = store.next_sample(7_200).unwrap().unwrap();
        assert_eq!(sample.epoch_seconds, 7_200);
        assert_eq!(sample.channels.as_slice(), &[1]);
        assert_eq!(store.next_sample(7_200).unwrap(), None);

        // Config lives next to the buckets
        ConfigStore::create(store.volume_mut()).unwrap();
        assert!(dir.path().join("config.txt").is_file());
    }
}
