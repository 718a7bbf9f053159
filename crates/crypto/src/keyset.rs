//! Team-Schluesselsatz pro Epoch
//!
//! Ein `KeySet` buendelt die vier unabhaengigen Kanal-Schluessel eines
//! Teams unter einer gemeinsamen Epoch. Er wird bei Join/Create aus dem
//! PSK abgeleitet, bei jeder Rotation als Ganzes ersetzt (nie teilweise
//! aktualisiert) und bei Leave/Kick/Widerruf geleert.

use teamfunk_core::{Psk, TeamId};
use teamfunk_protocol::TeamChannel;

use crate::error::CryptoResult;
use crate::provider::CryptoProvider;
use crate::types::SecretBytes;

/// Info-Tags fuer die Ableitung der Kanal-Schluessel aus dem PSK
pub const INFO_MGMT: &[u8] = b"teamfunk mgmt v1";
pub const INFO_POSITION: &[u8] = b"teamfunk pos v1";
pub const INFO_WAYPOINT: &[u8] = b"teamfunk wpt v1";
pub const INFO_CHAT: &[u8] = b"teamfunk chat v1";

/// Die vier Kanal-Schluessel eines Teams fuer eine Epoch
#[derive(Debug, Clone)]
pub struct KeySet {
    pub team_id: TeamId,
    /// Monoton steigende Schluessel-Generation (nie wiederverwendet)
    pub epoch: u32,
    /// Der PSK aus dem dieser Satz abgeleitet wurde – der Leader gibt
    /// ihn beim Pairing an neue Geraete weiter
    pub psk: Psk,
    pub mgmt: SecretBytes,
    pub position: SecretBytes,
    pub waypoint: SecretBytes,
    pub chat: SecretBytes,
    /// Nur ein gueltiger Satz darf zum Ver-/Entschluesseln benutzt werden
    pub gueltig: bool,
}

impl KeySet {
    /// Leitet einen vollstaendigen Schluesselsatz aus einem PSK ab
    ///
    /// Jeder Kanal bekommt ueber sein `info`-Tag einen unabhaengigen
    /// Schluessel aus demselben PSK.
    pub fn aus_psk(
        provider: &impl CryptoProvider,
        team_id: TeamId,
        epoch: u32,
        psk: &Psk,
    ) -> CryptoResult<Self> {
        Ok(Self {
            team_id,
            epoch,
            psk: psk.clone(),
            mgmt: provider.derive_key(psk.as_slice(), INFO_MGMT)?,
            position: provider.derive_key(psk.as_slice(), INFO_POSITION)?,
            waypoint: provider.derive_key(psk.as_slice(), INFO_WAYPOINT)?,
            chat: provider.derive_key(psk.as_slice(), INFO_CHAT)?,
            gueltig: true,
        })
    }

    /// Gibt den Schluessel fuer einen logischen Kanal zurueck
    ///
    /// Track-Telemetrie ist Positionsverlauf und laeuft unter dem
    /// Positions-Schluessel.
    pub fn kanal_schluessel(&self, kanal: TeamChannel) -> &SecretBytes {
        match kanal {
            TeamChannel::Management => &self.mgmt,
            TeamChannel::Position | TeamChannel::Track => &self.position,
            TeamChannel::Waypoint => &self.waypoint,
            TeamChannel::Chat => &self.chat,
        }
    }

    /// Leert den Schluesselsatz (Leave/Kick/Widerruf)
    pub fn leeren(&mut self) {
        self.psk = Psk::default();
        self.mgmt.nullen();
        self.position.nullen();
        self.waypoint.nullen();
        self.chat.nullen();
        self.gueltig = false;
    }
}

/// Erzeugt einen frischen 16-Byte Zufalls-PSK
pub fn zufalls_psk(provider: &impl CryptoProvider) -> Psk {
    let mut bytes = [0u8; Psk::KAPAZITAET];
    provider.fill_random(&mut bytes);
    Psk::aus_slice(&bytes).expect("Kapazitaet passt per Konstruktion")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aead::Aes256GcmProvider;

    fn test_keyset() -> KeySet {
        let provider = Aes256GcmProvider;
        let psk = Psk::aus_slice(&[0x42; 16]).unwrap();
        KeySet::aus_psk(&provider, TeamId([1; 8]), 1, &psk).unwrap()
    }

    #[test]
    fn vier_unabhaengige_kanal_schluessel() {
        let ks = test_keyset();
        assert_ne!(ks.mgmt.as_bytes(), ks.position.as_bytes());
        assert_ne!(ks.mgmt.as_bytes(), ks.waypoint.as_bytes());
        assert_ne!(ks.mgmt.as_bytes(), ks.chat.as_bytes());
        assert_ne!(ks.position.as_bytes(), ks.waypoint.as_bytes());
        assert_ne!(ks.position.as_bytes(), ks.chat.as_bytes());
        assert_ne!(ks.waypoint.as_bytes(), ks.chat.as_bytes());
    }

    #[test]
    fn ableitung_deterministisch() {
        let a = test_keyset();
        let b = test_keyset();
        assert_eq!(a.mgmt.as_bytes(), b.mgmt.as_bytes());
        assert_eq!(a.chat.as_bytes(), b.chat.as_bytes());
    }

    #[test]
    fn track_nutzt_positions_schluessel() {
        let ks = test_keyset();
        assert_eq!(
            ks.kanal_schluessel(TeamChannel::Track).as_bytes(),
            ks.kanal_schluessel(TeamChannel::Position).as_bytes()
        );
    }

    #[test]
    fn leeren_nullt_und_invalidiert() {
        let mut ks = test_keyset();
        assert!(ks.gueltig);
        ks.leeren();
        assert!(!ks.gueltig);
        assert_eq!(ks.mgmt.as_bytes(), &[0u8; 32]);
        assert_eq!(ks.chat.as_bytes(), &[0u8; 32]);
    }

    #[test]
    fn zufalls_psk_voll_und_verschieden() {
        let provider = Aes256GcmProvider;
        let a = zufalls_psk(&provider);
        let b = zufalls_psk(&provider);
        assert_eq!(a.laenge(), Psk::KAPAZITAET);
        assert_ne!(a.as_slice(), b.as_slice());
    }

    #[test]
    fn verschiedene_psks_geben_verschiedene_saetze() {
        let provider = Aes256GcmProvider;
        let a = KeySet::aus_psk(
            &provider,
            TeamId([1; 8]),
            1,
            &Psk::aus_slice(&[1; 16]).unwrap(),
        )
        .unwrap();
        let b = KeySet::aus_psk(
            &provider,
            TeamId([1; 8]),
            1,
            &Psk::aus_slice(&[2; 16]).unwrap(),
        )
        .unwrap();
        assert_ne!(a.mgmt.as_bytes(), b.mgmt.as_bytes());
    }
}
