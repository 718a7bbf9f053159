//! Kommando-Fassade des Team-Kanals
//!
//! Duenne Aufruf-Oberflaeche fuer die Bedienebene (UI, Konsole): buendelt
//! `SecureChannelService` und `KeyRotationPolicy` hinter einfachen
//! Kommandos und fuettert die Rotations-Richtlinie bei jedem Poll mit
//! den Ereignissen des Dienstes.

use teamfunk_core::{MemberId, Psk, TeamId};
use teamfunk_crypto::CryptoProvider;
use teamfunk_protocol::message::{
    self, Advertise, JoinDecision, JoinRequest, Roster, Status, StatusParams,
};

use crate::error::TeamError;
use crate::event::{SammelSenke, TeamEventSink};
use crate::rotation::{KeyRotationPolicy, RotationsKonfig};
use crate::service::SecureChannelService;
use crate::transport::MeshTransport;

/// Kommando-Oberflaeche fuer den Team-Kanal
pub struct TeamCommander<P, T>
where
    P: CryptoProvider,
    T: MeshTransport,
{
    service: SecureChannelService<P, T>,
    policy: KeyRotationPolicy,
    team_name: String,
}

impl<P, T> TeamCommander<P, T>
where
    P: CryptoProvider,
    T: MeshTransport,
{
    pub fn neu(service: SecureChannelService<P, T>, konfig: RotationsKonfig) -> Self {
        Self {
            service,
            policy: KeyRotationPolicy::neu(konfig),
            team_name: String::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Poll-Schleife
    // -----------------------------------------------------------------------

    /// Ein Durchlauf der kooperativen Schleife
    ///
    /// Leert die Eingangs-Queue, laesst die Rotations-Richtlinie jedes
    /// Ereignis beobachten (implizite Bestaetigung, Widerrufs-Erkennung)
    /// und reicht es dann an die Senke weiter. Anschliessend laufen die
    /// faelligen Zustell-Wiederholungen.
    pub fn poll(&mut self, senke: &mut dyn TeamEventSink, jetzt_ms: u64) {
        let mut sammel = SammelSenke::neu();
        self.service.process_incoming(&mut sammel, jetzt_ms);
        for (ctx, ereignis) in sammel.ereignisse {
            self.policy
                .beobachten(&mut self.service, &ctx, &ereignis, senke);
            senke.melden(&ctx, ereignis);
        }
        self.policy.tick(&mut self.service, senke, jetzt_ms);
    }

    // -----------------------------------------------------------------------
    // Team-Lebenszyklus
    // -----------------------------------------------------------------------

    /// Erstellt ein neues Team und uebernimmt die Leader-Rolle
    pub fn team_erstellen(&mut self, name: &str) -> Result<TeamId, TeamError> {
        let mut id_bytes = [0u8; 8];
        self.service.provider().fill_random(&mut id_bytes);
        let team_id = TeamId::from_bytes(id_bytes);
        self.policy.team_erstellen(&mut self.service, team_id)?;
        self.team_name = name.to_string();
        Ok(team_id)
    }

    /// Verlaesst das aktuelle Team und leert die Schluessel
    pub fn team_verlassen(&mut self) {
        self.policy.verlassen(&mut self.service);
        self.team_name.clear();
    }

    /// Uebernimmt etabliertes Schluesselmaterial (Pairing oder Konfig)
    ///
    /// Sendet anschliessend ein JoinConfirm ueber den nun verfuegbaren
    /// Team-Kanal – das ist zugleich die implizite Zustell-Bestaetigung
    /// fuer den Leader.
    pub fn schluessel_uebernehmen(
        &mut self,
        team_id: TeamId,
        epoch: u32,
        psk: &Psk,
        leader_id: MemberId,
    ) -> Result<(), TeamError> {
        self.policy
            .schluessel_uebernehmen(&mut self.service, team_id, epoch, psk, leader_id)?;
        let bestaetigung = message::JoinConfirm {
            team_id,
            member_id: self.service.eigene_id(),
        };
        if let Err(fehler) = self.service.send_join_confirm(bestaetigung) {
            tracing::warn!(%fehler, "JoinConfirm nicht gesendet");
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Kommandos
    // -----------------------------------------------------------------------

    /// Kuendigt das eigene Team im Klartext an (nur Leader)
    pub fn advertise_senden(&mut self) -> Result<(), TeamError> {
        self.pruefe_aktiv()?;
        if !self.policy.ist_leader() {
            return Err(TeamError::NichtLeader);
        }
        let team_id = self.service.team_id().ok_or(TeamError::KeinTeam)?;
        self.service.send_advertise(Advertise {
            team_id,
            leader_id: self.service.eigene_id(),
            name: self.team_name.clone(),
        })?;
        Ok(())
    }

    /// Fragt den Beitritt zu einem Team an; gibt die Nonce zurueck mit
    /// der die Antwort korreliert werden kann
    pub fn beitritt_anfragen(&mut self, team_id: TeamId) -> Result<u64, TeamError> {
        self.pruefe_aktiv()?;
        let mut nonce_bytes = [0u8; 8];
        self.service.provider().fill_random(&mut nonce_bytes);
        let nonce = u64::from_le_bytes(nonce_bytes);
        self.service.send_join_request(JoinRequest {
            team_id,
            member_id: self.service.eigene_id(),
            nonce,
        })?;
        Ok(nonce)
    }

    /// Nimmt eine Beitritts-Anfrage an: Entscheidung, Rotation, Verteilung
    pub fn beitritt_annehmen(
        &mut self,
        mitglied: MemberId,
        nonce_echo: u64,
        jetzt_ms: u64,
    ) -> Result<(), TeamError> {
        self.pruefe_aktiv()?;
        let team_id = self.service.team_id().ok_or(TeamError::KeinTeam)?;
        // Entscheidung noch unter der ausgehenden Epoch ans Team
        if let Err(fehler) = self.service.send_join_decision(JoinDecision {
            team_id,
            member_id: mitglied,
            angenommen: true,
        }) {
            tracing::warn!(%fehler, "JoinDecision nicht gesendet");
        }
        self.policy
            .mitglied_aufnehmen(&mut self.service, mitglied, nonce_echo, jetzt_ms)
    }

    /// Lehnt eine Beitritts-Anfrage ab
    pub fn beitritt_ablehnen(&mut self, mitglied: MemberId) -> Result<(), TeamError> {
        self.pruefe_aktiv()?;
        let team_id = self.service.team_id().ok_or(TeamError::KeinTeam)?;
        self.service.send_join_decision(JoinDecision {
            team_id,
            member_id: mitglied,
            angenommen: false,
        })?;
        Ok(())
    }

    /// Schliesst ein Mitglied aus und rotiert die Schluessel
    pub fn kick(&mut self, ziel: MemberId, jetzt_ms: u64) -> Result<(), TeamError> {
        self.pruefe_aktiv()?;
        self.policy
            .mitglied_entfernen(&mut self.service, ziel, jetzt_ms)
    }

    /// Uebergibt die Leader-Rolle (ohne Rotation)
    pub fn leader_uebertragen(&mut self, ziel: MemberId) -> Result<(), TeamError> {
        self.pruefe_aktiv()?;
        self.policy.leader_uebertragen(&mut self.service, ziel)
    }

    /// Sendet einen Team-Status; optional mit Parametern und Roster
    pub fn status_senden(
        &mut self,
        params: Option<StatusParams>,
        mit_roster: bool,
    ) -> Result<(), TeamError> {
        self.pruefe_aktiv()?;
        let epoch = self.service.epoch().ok_or(TeamError::KeinTeam)?;
        let mitglieder = self.policy.mitglieder().to_vec();
        let roster = if mit_roster {
            let leader_id = self
                .policy
                .leader_id()
                .unwrap_or_else(|| self.service.eigene_id());
            let mut liste = mitglieder.clone();
            if liste.len() > message::MAX_ROSTER {
                tracing::warn!(
                    anzahl = liste.len(),
                    "Roster auf {} Eintraege gekuerzt",
                    message::MAX_ROSTER
                );
                liste.truncate(message::MAX_ROSTER);
            }
            Some(Roster {
                leader_id,
                mitglieder: liste,
            })
        } else {
            None
        };
        self.service.send_status(Status {
            member_hash: message::mitglieder_hash(&mitglieder),
            epoch,
            params,
            roster,
        })?;
        Ok(())
    }

    /// Sendet eine Chat-Nachricht an das Team
    pub fn chat_senden(&mut self, daten: &[u8]) -> Result<(), TeamError> {
        self.pruefe_aktiv()?;
        Ok(self.service.send_chat(daten)?)
    }

    /// Sendet die eigene Position an das Team
    pub fn position_senden(&mut self, daten: &[u8]) -> Result<(), TeamError> {
        self.pruefe_aktiv()?;
        Ok(self.service.send_position(daten)?)
    }

    /// Sendet einen Wegpunkt an das Team
    pub fn waypoint_senden(&mut self, daten: &[u8]) -> Result<(), TeamError> {
        self.pruefe_aktiv()?;
        Ok(self.service.send_waypoint(daten)?)
    }

    /// Sendet Track-Telemetrie an das Team
    pub fn track_senden(&mut self, daten: &[u8]) -> Result<(), TeamError> {
        self.pruefe_aktiv()?;
        Ok(self.service.send_track(daten)?)
    }

    fn pruefe_aktiv(&self) -> Result<(), TeamError> {
        if self.policy.ist_widerrufen() {
            return Err(TeamError::Widerrufen);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Zustand
    // -----------------------------------------------------------------------

    pub fn team_id(&self) -> Option<TeamId> {
        self.service.team_id()
    }

    pub fn epoch(&self) -> Option<u32> {
        self.service.epoch()
    }

    pub fn eigene_id(&self) -> MemberId {
        self.service.eigene_id()
    }

    pub fn ist_leader(&self) -> bool {
        self.policy.ist_leader()
    }

    pub fn ist_widerrufen(&self) -> bool {
        self.policy.ist_widerrufen()
    }

    pub fn mitglieder(&self) -> &[MemberId] {
        self.policy.mitglieder()
    }

    pub fn team_name(&self) -> &str {
        &self.team_name
    }

    /// PSK der aktuellen Epoch – der Leader gibt ihn beim Pairing weiter
    pub fn aktueller_psk(&self) -> Option<Psk> {
        self.service.schluessel().map(|ks| ks.psk.clone())
    }

    /// Anzahl noch unbestaetigter Schluessel-Zustellungen
    pub fn ausstehende_zustellungen(&self) -> usize {
        self.policy.ausstehende_zustellungen()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::TeamEvent;
    use crate::transport::{MeshEingang, MeshTransport, MeshZiel};
    use std::collections::VecDeque;
    use teamfunk_crypto::Aes256GcmProvider;

    #[derive(Debug, Default)]
    struct TestFunk {
        gesendet: Vec<(u8, u16, Vec<u8>, MeshZiel, bool)>,
        eingang: VecDeque<MeshEingang>,
    }

    impl MeshTransport for TestFunk {
        fn senden(
            &mut self,
            kanal: u8,
            portnum: u16,
            daten: &[u8],
            ziel: MeshZiel,
            want_ack: bool,
        ) -> bool {
            self.gesendet
                .push((kanal, portnum, daten.to_vec(), ziel, want_ack));
            true
        }

        fn poll_eingang(&mut self) -> Option<MeshEingang> {
            self.eingang.pop_front()
        }
    }

    fn kommandant(id: u32) -> TeamCommander<Aes256GcmProvider, TestFunk> {
        let service =
            SecureChannelService::neu(Aes256GcmProvider, TestFunk::default(), MemberId(id));
        TeamCommander::neu(service, RotationsKonfig::default())
    }

    #[test]
    fn team_erstellen_liefert_id_und_leader_rolle() {
        let mut k = kommandant(1);
        let team = k.team_erstellen("Alpha").unwrap();
        assert_eq!(k.team_id(), Some(team));
        assert_eq!(k.epoch(), Some(1));
        assert!(k.ist_leader());
        assert_eq!(k.team_name(), "Alpha");
    }

    #[test]
    fn zwei_teams_bekommen_verschiedene_ids() {
        let mut a = kommandant(1);
        let mut b = kommandant(2);
        assert_ne!(
            a.team_erstellen("A").unwrap(),
            b.team_erstellen("B").unwrap()
        );
    }

    #[test]
    fn advertise_nur_als_leader() {
        let mut k = kommandant(2);
        k.schluessel_uebernehmen(
            TeamId([3; 8]),
            1,
            &Psk::aus_slice(&[1; 16]).unwrap(),
            MemberId(1),
        )
        .unwrap();
        assert!(matches!(
            k.advertise_senden().unwrap_err(),
            TeamError::NichtLeader
        ));
    }

    #[test]
    fn schluessel_uebernehmen_sendet_join_confirm() {
        let mut k = kommandant(2);
        k.schluessel_uebernehmen(
            TeamId([3; 8]),
            1,
            &Psk::aus_slice(&[1; 16]).unwrap(),
            MemberId(1),
        )
        .unwrap();
        assert_eq!(k.epoch(), Some(1));
        assert!(!k.ist_leader());
        // Genau ein verschluesseltes Paket (JoinConfirm) wurde gesendet
        assert_eq!(k.service.transport.gesendet.len(), 1);
    }

    #[test]
    fn status_mit_roster_traegt_hash_der_vollen_liste() {
        let mut k = kommandant(1);
        k.team_erstellen("Alpha").unwrap();
        k.status_senden(
            Some(StatusParams {
                sende_intervall_s: 30,
                flags: 0,
            }),
            true,
        )
        .unwrap();
        assert!(!k.service.transport.gesendet.is_empty());
    }

    #[test]
    fn beitritt_anfragen_liefert_nonce() {
        let mut k = kommandant(5);
        let nonce = k.beitritt_anfragen(TeamId([3; 8])).unwrap();
        let nochmal = k.beitritt_anfragen(TeamId([3; 8])).unwrap();
        assert_ne!(nonce, nochmal);
    }

    #[test]
    fn beitritt_annehmen_rotiert_die_epoch() {
        let mut leader = kommandant(1);
        let team = leader.team_erstellen("Alpha").unwrap();

        leader
            .beitritt_annehmen(MemberId(3), 0xAB, 1_000)
            .unwrap();
        assert_eq!(leader.epoch(), Some(2));
        assert_eq!(leader.team_id(), Some(team));
        assert!(leader.mitglieder().contains(&MemberId(3)));
    }

    #[test]
    fn widerrufener_kommandant_lehnt_kommandos_ab() {
        let mut k = kommandant(2);
        let team = TeamId([3; 8]);
        k.schluessel_uebernehmen(team, 1, &Psk::aus_slice(&[1; 16]).unwrap(), MemberId(1))
            .unwrap();

        // Kick an uns selbst einspielen: Leader (1) kickt Mitglied (2)
        let mut leader = kommandant(1);
        leader
            .schluessel_uebernehmen(team, 1, &Psk::aus_slice(&[1; 16]).unwrap(), MemberId(1))
            .unwrap();
        leader.service.send_kick(MemberId(2)).unwrap();
        let (kanal, portnum, daten, _, _) = leader.service.transport.gesendet.pop().unwrap();
        k.service.transport.eingang.push_back(MeshEingang {
            portnum,
            from: MemberId(1),
            kanal,
            payload: daten,
        });

        let mut senke = SammelSenke::neu();
        k.poll(&mut senke, 0);

        assert!(k.ist_widerrufen());
        assert!(matches!(
            k.chat_senden(b"x").unwrap_err(),
            TeamError::Widerrufen
        ));
        assert!(senke
            .ereignisse
            .iter()
            .any(|(_, e)| matches!(e, TeamEvent::ZugriffWiderrufen)));
    }
}
