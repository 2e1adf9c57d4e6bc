//! [`Volume`] over a FAT-formatted SD card, using `embedded-sdmmc`.
//!
//! The volume and its root directory stay open while attached, and the log
//! store keeps its bucket files open across calls, so this uses the raw
//! handle API of [`VolumeManager`] instead of the RAII wrappers.
//!
//! `embedded-sdmmc` only creates FAT 8.3 names, so buckets on the card are
//! named `YYMMDDHH.CSV` (see [`super::FileNaming::Short`]).

use core::fmt::Debug;

use embedded_sdmmc::{
    BlockDevice, DirEntry, Mode, RawDirectory, RawFile, RawVolume, TimeSource, Timestamp, VolumeIdx,
    VolumeManager,
};
use log::{debug, warn};
use thiserror_no_std::Error;

use crate::clock::Clock;

use super::{OpenMode, Volume};

/// Longest 8.3 name, `BASENAME.EXT`.
type ShortName = heapless::String<12>;

#[derive(Error, Debug)]
pub enum SdVolumeError<E: Debug> {
    #[error("SD volume not attached")]
    NotAttached,
    #[error("FAT error: {0:?}")]
    Fat(embedded_sdmmc::Error<E>),
}

impl<E: Debug> From<embedded_sdmmc::Error<E>> for SdVolumeError<E> {
    fn from(e: embedded_sdmmc::Error<E>) -> Self {
        Self::Fat(e)
    }
}

/// The first FAT volume on an SD card (or any other [`BlockDevice`]).
pub struct SdCardVolume<D, T>
where
    D: BlockDevice,
    T: TimeSource,
{
    volume_mgr: VolumeManager<D, T, 4, 4, 1>,
    /// Volume and root directory handles, kept until they close cleanly
    mounted: Option<(RawVolume, RawDirectory)>,
    attached: bool,
    /// Files the log or config store still holds
    open_files: heapless::Vec<RawFile, 4>,
}

impl<D, T> SdCardVolume<D, T>
where
    D: BlockDevice,
    T: TimeSource,
{
    pub fn new(device: D, time_source: T) -> Self {
        Self {
            volume_mgr: VolumeManager::new(device, time_source),
            mounted: None,
            attached: false,
            open_files: heapless::Vec::new(),
        }
    }

    fn root(&self) -> Result<RawDirectory, SdVolumeError<D::Error>> {
        match self.mounted {
            Some((_, root)) if self.attached => Ok(root),
            _ => Err(SdVolumeError::NotAttached),
        }
    }

    /// Close everything still open. Handles that fail to close are kept so
    /// the next attach can try again.
    fn unmount(&mut self) -> Result<(), SdVolumeError<D::Error>> {
        let volume_mgr = &self.volume_mgr;
        self.open_files
            .retain(|file| volume_mgr.close_file(*file).is_err());

        let Some((volume, root)) = self.mounted else {
            return Ok(());
        };
        // An already-closed root reports an error here; closing the volume
        // below is what decides whether the unmount worked.
        let _ = self.volume_mgr.close_dir(root);
        self.volume_mgr.close_volume(volume)?;
        self.mounted = None;
        Ok(())
    }
}

impl<D, T> Volume for SdCardVolume<D, T>
where
    D: BlockDevice,
    T: TimeSource,
{
    type File = RawFile;
    type Error = SdVolumeError<D::Error>;

    const LONG_FILE_NAMES: bool = false;

    fn attach(&mut self) -> Result<(), Self::Error> {
        if self.attached {
            return Ok(());
        }
        // Leftovers from a failed detach
        self.unmount()?;

        let volume = self.volume_mgr.open_raw_volume(VolumeIdx(0))?;
        let root = match self.volume_mgr.open_root_dir(volume) {
            Ok(root) => root,
            Err(e) => {
                let _ = self.volume_mgr.close_volume(volume);
                return Err(e.into());
            }
        };

        self.mounted = Some((volume, root));
        self.attached = true;
        debug!("SD volume mounted");
        Ok(())
    }

    fn is_attached(&self) -> bool {
        self.attached
    }

    fn detach(&mut self) {
        self.attached = false;
        if let Err(e) = self.unmount() {
            warn!("SD volume did not unmount cleanly: {:?}", e);
        }
    }

    fn open(&mut self, name: &str, mode: OpenMode) -> Result<Self::File, Self::Error> {
        let root = self.root()?;
        let mode = match mode {
            OpenMode::Read => Mode::ReadOnly,
            OpenMode::Append => Mode::ReadWriteCreateOrAppend,
            OpenMode::Truncate => Mode::ReadWriteCreateOrTruncate,
        };

        let file = self.volume_mgr.open_file_in_dir(root, name, mode)?;
        if self.open_files.push(file).is_err() {
            // More handles than the volume manager allows; cannot happen
            // unless the manager's limits change.
            let _ = self.volume_mgr.close_file(file);
            return Err(SdVolumeError::Fat(embedded_sdmmc::Error::TooManyOpenFiles));
        }
        Ok(file)
    }

    fn read(&mut self, file: &mut Self::File, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.root()?;
        Ok(self.volume_mgr.read(*file, buf)?)
    }

    fn write(&mut self, file: &mut Self::File, data: &[u8]) -> Result<usize, Self::Error> {
        self.root()?;
        // embedded-sdmmc writes everything or fails (e.g. `DiskFull`)
        self.volume_mgr.write(*file, data)?;
        Ok(data.len())
    }

    fn flush(&mut self, file: &mut Self::File) -> Result<(), Self::Error> {
        self.root()?;
        Ok(self.volume_mgr.flush_file(*file)?)
    }

    fn close(&mut self, file: Self::File) -> Result<(), Self::Error> {
        self.volume_mgr.close_file(file)?;
        self.open_files.retain(|open| *open != file);
        Ok(())
    }

    fn for_each_file(&mut self, visit: &mut dyn FnMut(&str)) -> Result<(), Self::Error> {
        let root = self.root()?;
        self.volume_mgr.iterate_dir(root, |entry| {
            if let Some(name) = regular_file_name(entry) {
                visit(&name);
            }
        })?;
        Ok(())
    }

    fn exists(&mut self, name: &str) -> Result<bool, Self::Error> {
        let root = self.root()?;
        match self.volume_mgr.find_directory_entry(root, name) {
            Ok(entry) => Ok(regular_file_name(&entry).is_some()),
            Err(embedded_sdmmc::Error::NotFound | embedded_sdmmc::Error::FilenameError(_)) => {
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// `BASENAME.EXT` for regular files; `None` for directories, volume labels
/// and names that are not valid UTF-8.
fn regular_file_name(entry: &DirEntry) -> Option<ShortName> {
    if entry.attributes.is_directory() || entry.attributes.is_volume() {
        return None;
    }
    short_name(entry.name.base_name(), entry.name.extension())
}

fn short_name(base: &[u8], extension: &[u8]) -> Option<ShortName> {
    let mut name = ShortName::new();
    name.push_str(core::str::from_utf8(base).ok()?).ok()?;
    if !extension.is_empty() {
        name.push('.').ok()?;
        name.push_str(core::str::from_utf8(extension).ok()?).ok()?;
    }
    Some(name)
}

/// FAT timestamps for created and modified files, taken from the logger clock.
pub struct ClockTimeSource<C>(pub C);

impl<C: Clock> TimeSource for ClockTimeSource<C> {
    fn get_timestamp(&self) -> Timestamp {
        let now = self.0.now_local();
        if now.year >= 1980
            && let Ok(stamp) =
                Timestamp::from_calendar(now.year, now.month, now.day, now.hour, now.minute, now.second)
        {
            return stamp;
        }
        // FAT cannot store dates before 1980
        Timestamp {
            year_since_1970: 10,
            zero_indexed_month: 0,
            zero_indexed_day: 0,
            hours: 0,
            minutes: 0,
            seconds: 0,
        }
    }
}
