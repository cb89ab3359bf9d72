use crate::header::Luks2Header;
use crate::keyslot::{self, UnlockOutcome};
use crate::metadata::{Luks2Keyslot, Luks2KeyslotPriority, Luks2Metadata};
use crate::{LUKS2_BINARY_HEADER_SIZE, LuksError};
use std::io::{Read, Seek};

/// An opened LUKS2 device: its verified header and parsed metadata.
///
/// Opening reads only the header region. Keyslot areas are read from the same reader when a
/// passphrase is tried.
#[derive(Debug, Clone)]
pub struct Luks2Device {
    header: Luks2Header,
    metadata: Luks2Metadata,
}

impl Luks2Device {
    /// Reads and validates the primary header at offset 0.
    ///
    /// The header size is validated before anything past the fixed fields is read, and the
    /// metadata is only parsed once the checksum over the whole region has matched.
    pub fn open<R: Read + Seek>(reader: &mut R) -> Result<Self, LuksError> {
        let hdr_size = Luks2Header::read_size(reader)?;
        let region = Luks2Header::read_region(reader, hdr_size)?;
        Luks2Header::verify_checksum(&region)?;

        let header = Luks2Header::parse(&region)?;
        if header.hdr_offset != 0 {
            return Err(LuksError::InvalidHeader(format!(
                "Primary header claims offset {}",
                header.hdr_offset
            )));
        }
        let metadata = Luks2Metadata::from_json_area(&region[LUKS2_BINARY_HEADER_SIZE..])?;

        log::debug!(
            "opened LUKS2 device {} (header size {}, seqid {}, {} keyslots, {} segments)",
            header.uuid,
            hdr_size,
            header.seqid,
            metadata.keyslots.len(),
            metadata.segments.len()
        );
        Ok(Luks2Device { header, metadata })
    }

    pub fn uuid(&self) -> &str {
        self.header.uuid.as_str()
    }

    pub fn label(&self) -> &str {
        &self.header.label
    }

    pub fn header(&self) -> &Luks2Header {
        &self.header
    }

    pub fn metadata(&self) -> &Luks2Metadata {
        &self.metadata
    }

    /// Returns the number of configured keyslots.
    pub fn num_keyslots(&self) -> usize {
        self.metadata.keyslots.len()
    }

    /// Keyslots tried by [`Luks2Device::unlock_any`], in order.
    ///
    /// High priority keyslots come first, then normal ones, each group by ascending index.
    /// Ignored keyslots and keyslots that hold no key are left out.
    pub fn active_keyslots(&self) -> Vec<u32> {
        let mut active: Vec<(Luks2KeyslotPriority, u32)> = self
            .metadata
            .keyslots
            .iter()
            .filter(|(_, slot)| matches!(slot, Luks2Keyslot::Luks2 { .. }))
            .map(|(index, slot)| (slot.priority(), *index))
            .filter(|(priority, _)| *priority != Luks2KeyslotPriority::Ignore)
            .collect();
        active.sort_by(|(pa, ia), (pb, ib)| pb.cmp(pa).then(ia.cmp(ib)));
        active.into_iter().map(|(_, index)| index).collect()
    }

    /// Tries a passphrase against one keyslot, whatever its priority.
    pub fn unlock_keyslot<R: Read + Seek>(
        &self,
        reader: &mut R,
        index: u32,
        passphrase: &[u8],
    ) -> Result<UnlockOutcome, LuksError> {
        keyslot::unlock(&self.metadata, reader, index, passphrase)
    }

    /// Tries a passphrase against every active keyslot and returns the first match.
    ///
    /// A wrong passphrase moves on to the next keyslot. Any error stops the search: a keyslot
    /// that cannot be evaluated is never silently skipped.
    pub fn unlock_any<R: Read + Seek>(&self, reader: &mut R, passphrase: &[u8]) -> Result<UnlockOutcome, LuksError> {
        for index in self.active_keyslots() {
            match self.unlock_keyslot(reader, index, passphrase)? {
                UnlockOutcome::Unlocked(volume) => return Ok(UnlockOutcome::Unlocked(volume)),
                UnlockOutcome::WrongPassphrase => continue,
            }
        }
        log::debug!("no keyslot of {} matches the passphrase", self.header.uuid);
        Ok(UnlockOutcome::WrongPassphrase)
    }
}
