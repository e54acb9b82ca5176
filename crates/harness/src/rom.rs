use sha2::{Digest, Sha256};

use std::io;
use std::path::{Path, PathBuf};

use crate::Error;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RomId([u8; 32]);

impl std::fmt::Display for RomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for b in self.0 {
            write!(f, "{:02X}", b)?
        }
        Ok(())
    }
}

impl RomId {
    pub fn new(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        let mut hash = [0; 32];
        hash.copy_from_slice(&hasher.finalize());
        Self(hash)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Mirroring {
    Horizontal,
    Vertical,
    FourScreen,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct InesHeader {
    pub nes_2: bool,
    pub prg_rom_bytes: usize,
    pub chr_rom_bytes: usize,
    pub mapper: u8,
    pub mirroring: Mirroring,
    pub trainer: bool,
    pub battery: bool,
}

impl InesHeader {
    const MAGIC: [u8; 4] = [0x4E, 0x45, 0x53, 0x1A];

    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < 16 || !data.starts_with(&Self::MAGIC) {
            return None;
        }

        let nes_2 = data[7] & 0xc == 0x8;

        let prg_hi = if nes_2 { data[9] as usize & 0xf } else { 0 };
        let prg_rom_bytes = (data[4] as usize | (prg_hi << 8)) << 14;

        let chr_hi = if nes_2 { (data[9] as usize >> 4) & 0xf } else { 0 };
        let chr_rom_bytes = (data[5] as usize | (chr_hi << 8)) << 13;

        let mapper = (data[6] >> 4) | (data[7] & 0xF0);

        let mirroring = if data[6] & 0x08 != 0 {
            Mirroring::FourScreen
        } else if data[6] & 0x01 != 0 {
            Mirroring::Vertical
        } else {
            Mirroring::Horizontal
        };

        Some(InesHeader {
            nes_2,
            prg_rom_bytes,
            chr_rom_bytes,
            mapper,
            mirroring,
            trainer: data[6] & 0x04 != 0,
            battery: data[6] & 0x02 != 0,
        })
    }

    /// Number of bytes the header claims the image should contain.
    pub fn expected_len(&self) -> usize {
        let trainer = if self.trainer { 512 } else { 0 };
        16 + trainer + self.prg_rom_bytes + self.chr_rom_bytes
    }

    pub fn format(&self) -> &'static str {
        if self.nes_2 {
            "NES 2.0"
        } else {
            "iNES"
        }
    }
}

/// Program image handed to the engine. Read once per session and never
/// modified afterwards.
#[derive(Debug, Clone)]
pub struct RomImage {
    path: PathBuf,
    bytes: Vec<u8>,
    id: RomId,
    header: Option<InesHeader>,
}

impl RomImage {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::RomNotFound(path.to_path_buf()))
            }
            Err(e) => return Err(Error::RomRead(path.to_path_buf(), e)),
        };

        Ok(Self::from_bytes(path, bytes))
    }

    pub fn from_bytes<P: Into<PathBuf>>(path: P, bytes: Vec<u8>) -> Self {
        let id = RomId::new(&bytes);
        let header = InesHeader::parse(&bytes);

        Self {
            path: path.into(),
            bytes,
            id,
            header,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn id(&self) -> RomId {
        self.id
    }

    pub fn header(&self) -> Option<&InesHeader> {
        self.header.as_ref()
    }

    /// Short human readable description used in logs and reports.
    pub fn describe(&self) -> String {
        match &self.header {
            Some(h) => format!(
                "{} {} bytes, {} PRGROM: {}, CHRROM: {}, Mapper: {}, {:?}",
                self.path.display(),
                self.bytes.len(),
                h.format(),
                h.prg_rom_bytes,
                h.chr_rom_bytes,
                h.mapper,
                h.mirroring,
            ),
            None => format!(
                "{} {} bytes, no iNES header",
                self.path.display(),
                self.bytes.len()
            ),
        }
    }
}
