//! Bounds-gecheckter Byte-Cursor fuer die Wire-Codecs
//!
//! Jeder Lesezugriff prueft zuerst die verbleibende Puffer-Laenge und
//! liefert `WireError::Abgeschnitten` statt ueber das Slice hinaus zu
//! lesen. Alle Mehr-Byte-Felder sind little-endian.

use bytes::BufMut;

use crate::error::{WireError, WireResult};

/// Lese-Cursor ueber einen Byte-Slice
#[derive(Debug)]
pub struct Reader<'a> {
    daten: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn neu(daten: &'a [u8]) -> Self {
        Self { daten, pos: 0 }
    }

    /// Verbleibende Bytes
    pub fn rest(&self) -> usize {
        self.daten.len() - self.pos
    }

    /// Prueft ob noch `n` Bytes verfuegbar sind
    fn pruefe(&self, n: usize) -> WireResult<()> {
        if self.rest() < n {
            return Err(WireError::Abgeschnitten {
                benoetigt: n,
                verfuegbar: self.rest(),
            });
        }
        Ok(())
    }

    pub fn u8(&mut self) -> WireResult<u8> {
        self.pruefe(1)?;
        let b = self.daten[self.pos];
        self.pos += 1;
        Ok(b)
    }

    pub fn u16_le(&mut self) -> WireResult<u16> {
        self.pruefe(2)?;
        let v = u16::from_le_bytes([self.daten[self.pos], self.daten[self.pos + 1]]);
        self.pos += 2;
        Ok(v)
    }

    pub fn u32_le(&mut self) -> WireResult<u32> {
        self.pruefe(4)?;
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&self.daten[self.pos..self.pos + 4]);
        self.pos += 4;
        Ok(u32::from_le_bytes(buf))
    }

    pub fn u64_le(&mut self) -> WireResult<u64> {
        self.pruefe(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.daten[self.pos..self.pos + 8]);
        self.pos += 8;
        Ok(u64::from_le_bytes(buf))
    }

    /// Liest `n` rohe Bytes
    pub fn bytes(&mut self, n: usize) -> WireResult<&'a [u8]> {
        self.pruefe(n)?;
        let slice = &self.daten[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Liest ein Array fester Groesse
    pub fn array<const N: usize>(&mut self) -> WireResult<[u8; N]> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.bytes(N)?);
        Ok(buf)
    }

    /// Prueft dass der Puffer vollstaendig konsumiert wurde
    pub fn fertig(&self) -> WireResult<()> {
        if self.rest() != 0 {
            return Err(WireError::UngueltigesFeld("unerwartete Restbytes"));
        }
        Ok(())
    }
}

/// Schreib-Cursor der in einen wachsenden Puffer kodiert
#[derive(Debug, Default)]
pub struct Writer {
    puffer: Vec<u8>,
}

impl Writer {
    pub fn neu() -> Self {
        Self::default()
    }

    pub fn mit_kapazitaet(n: usize) -> Self {
        Self {
            puffer: Vec::with_capacity(n),
        }
    }

    pub fn u8(&mut self, v: u8) {
        self.puffer.put_u8(v);
    }

    pub fn u16_le(&mut self, v: u16) {
        self.puffer.put_u16_le(v);
    }

    pub fn u32_le(&mut self, v: u32) {
        self.puffer.put_u32_le(v);
    }

    pub fn u64_le(&mut self, v: u64) {
        self.puffer.put_u64_le(v);
    }

    pub fn bytes(&mut self, daten: &[u8]) {
        self.puffer.put_slice(daten);
    }

    pub fn laenge(&self) -> usize {
        self.puffer.len()
    }

    pub fn fertig(self) -> Vec<u8> {
        self.puffer
    }
}
