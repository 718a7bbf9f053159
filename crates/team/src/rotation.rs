//! Schluessel-Rotation und Zustell-Verfolgung
//!
//! Jedes mitgliedschafts-aendernde Ereignis – angenommener Beitritt oder
//! Kick – erhoeht die Epoch um genau eins und erzeugt frisches Material
//! fuer alle vier Kanaele. Eine Leader-Uebergabe rotiert nicht.
//!
//! Die Zustellung des neuen Materials ist nicht garantiert. Jede
//! Verteilung wird deshalb pro `(Mitglied, Epoch)` verfolgt und nach
//! Intervall erneut gesendet, bis eine begrenzte Versuchszahl erreicht
//! ist. Bestaetigt wird implizit: jede authentisierte Nachricht des
//! Mitglieds unter der neuen Epoch loescht den Eintrag – eine explizite
//! Quittung gibt es nicht.
//!
//! Auf der Mitglieds-Seite gilt die Umkehrung: wer Management-Verkehr
//! unter seiner vertrauten Epoch wiederholt nicht authentisieren kann,
//! ist ausgeschlossen worden, geht in den terminalen Widerrufs-Zustand
//! und leert seine Schluessel.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use teamfunk_core::{EventContext, MemberId, Psk, TeamId};
use teamfunk_crypto::{keyset::zufalls_psk, CryptoProvider, KeySet, SecretBytes};
use teamfunk_protocol::message::JoinAccept;
use teamfunk_protocol::TeamChannel;

use crate::error::TeamError;
use crate::event::{ReceiveFailure, TeamEvent, TeamEventSink};
use crate::service::SecureChannelService;
use crate::transport::MeshTransport;

/// Einstellungen der Rotations-Richtlinie
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationsKonfig {
    /// Intervall zwischen Zustell-Versuchen in Millisekunden
    pub resend_intervall_ms: u64,
    /// Maximale Sende-Versuche pro `(Mitglied, Epoch)` inkl. Erstversand
    pub max_versuche: u8,
    /// Aufeinanderfolgende Authentisierungs-Fehler bis zum Widerruf
    pub widerruf_schwelle: u8,
}

impl Default for RotationsKonfig {
    fn default() -> Self {
        Self {
            resend_intervall_ms: 5_000,
            max_versuche: 5,
            widerruf_schwelle: 8,
        }
    }
}

/// Eine noch unbestaetigte Schluessel-Zustellung
///
/// Traegt den Management-Schluessel der jeweils ausgehenden Epoch, damit
/// Wiederholungen auch nach weiteren Rotationen noch unter dem Material
/// laufen dem der Empfaenger zuletzt vertraut hat.
#[derive(Debug, Clone)]
struct AusstehendeVerteilung {
    psk: Psk,
    unter_schluessel: SecretBytes,
    versuche: u8,
    faellig_ms: u64,
}

/// Rotations-Richtlinie des Team-Kanals
///
/// Haelt die Mitglieder-Liste, die ausstehenden Zustellungen und den
/// Widerrufs-Zaehler der Mitglieds-Seite.
#[derive(Debug)]
pub struct KeyRotationPolicy {
    konfig: RotationsKonfig,
    ist_leader: bool,
    leader_id: Option<MemberId>,
    mitglieder: Vec<MemberId>,
    ausstehend: HashMap<(MemberId, u32), AusstehendeVerteilung>,
    fehlversuche: u8,
    widerrufen: bool,
}

impl KeyRotationPolicy {
    pub fn neu(konfig: RotationsKonfig) -> Self {
        Self {
            konfig,
            ist_leader: false,
            leader_id: None,
            mitglieder: Vec::new(),
            ausstehend: HashMap::new(),
            fehlversuche: 0,
            widerrufen: false,
        }
    }

    pub fn ist_leader(&self) -> bool {
        self.ist_leader
    }

    pub fn leader_id(&self) -> Option<MemberId> {
        self.leader_id
    }

    /// Terminal: dieses Geraet wurde aus dem Team ausgeschlossen
    pub fn ist_widerrufen(&self) -> bool {
        self.widerrufen
    }

    pub fn mitglieder(&self) -> &[MemberId] {
        &self.mitglieder
    }

    /// Anzahl noch unbestaetigter Zustellungen
    pub fn ausstehende_zustellungen(&self) -> usize {
        self.ausstehend.len()
    }

    // -----------------------------------------------------------------------
    // Team-Lebenszyklus
    // -----------------------------------------------------------------------

    /// Erstellt ein neues Team mit Epoch 1 und frischem PSK (Leader-Rolle)
    pub fn team_erstellen<P, T>(
        &mut self,
        service: &mut SecureChannelService<P, T>,
        team_id: TeamId,
    ) -> Result<(), TeamError>
    where
        P: CryptoProvider,
        T: MeshTransport,
    {
        let psk = zufalls_psk(service.provider());
        let ks = KeySet::aus_psk(service.provider(), team_id, 1, &psk)?;
        service.schluessel_installieren(ks);
        self.ist_leader = true;
        self.leader_id = Some(service.eigene_id());
        self.mitglieder = vec![service.eigene_id()];
        self.zuruecksetzen();
        tracing::info!(%team_id, "Team erstellt (Epoch 1)");
        Ok(())
    }

    /// Uebernimmt etablierte Schluessel (Pairing-Abschluss oder Konfiguration)
    pub fn schluessel_uebernehmen<P, T>(
        &mut self,
        service: &mut SecureChannelService<P, T>,
        team_id: TeamId,
        epoch: u32,
        psk: &Psk,
        leader_id: MemberId,
    ) -> Result<(), TeamError>
    where
        P: CryptoProvider,
        T: MeshTransport,
    {
        let ks = KeySet::aus_psk(service.provider(), team_id, epoch, psk)?;
        service.schluessel_installieren(ks);
        self.ist_leader = leader_id == service.eigene_id();
        self.leader_id = Some(leader_id);
        self.mitglieder = vec![leader_id, service.eigene_id()];
        self.mitglieder.dedup();
        self.zuruecksetzen();
        tracing::info!(%team_id, epoch, "Schluessel uebernommen");
        Ok(())
    }

    /// Verlaesst das Team und leert alle Schluessel
    pub fn verlassen<P, T>(&mut self, service: &mut SecureChannelService<P, T>)
    where
        P: CryptoProvider,
        T: MeshTransport,
    {
        service.schluessel_loeschen();
        self.ist_leader = false;
        self.leader_id = None;
        self.mitglieder.clear();
        self.zuruecksetzen();
    }

    fn zuruecksetzen(&mut self) {
        self.ausstehend.clear();
        self.fehlversuche = 0;
        self.widerrufen = false;
    }

    // -----------------------------------------------------------------------
    // Mitgliedschafts-Aenderungen (rotierend)
    // -----------------------------------------------------------------------

    /// Nimmt ein Mitglied auf: Epoch +1, frisches Material, Verteilung
    ///
    /// Das neue Material geht vor dem lokalen Umschalten an jedes
    /// Mitglied einzeln – auch an den Beitretenden, dessen Pairing-Material
    /// noch aus der ausgehenden Epoch stammt – verschluesselt unter dem
    /// Management-Schluessel der ausgehenden Epoch. Nach dem Umschalten
    /// geht die formale Annahme samt Nonce-Echo an den Beitretenden.
    pub fn mitglied_aufnehmen<P, T>(
        &mut self,
        service: &mut SecureChannelService<P, T>,
        neu: MemberId,
        nonce_echo: u64,
        jetzt_ms: u64,
    ) -> Result<(), TeamError>
    where
        P: CryptoProvider,
        T: MeshTransport,
    {
        self.pruefe_leader()?;
        if !self.mitglieder.contains(&neu) {
            self.mitglieder.push(neu);
        }
        let psk_neu = zufalls_psk(service.provider());
        let (team_id, epoch_neu) = self.rotation_beginnen(service, &psk_neu, jetzt_ms)?;
        self.rotation_abschliessen(service, team_id, epoch_neu, &psk_neu)?;

        let annahme = JoinAccept {
            team_id,
            epoch: epoch_neu,
            nonce_echo,
            psk: psk_neu.clone(),
        };
        if let Err(fehler) = service.send_join_accept(annahme, neu) {
            tracing::warn!(%fehler, "JoinAccept nicht gesendet");
        }
        tracing::info!(mitglied = %neu, epoch = epoch_neu, "Beitritt angenommen, Epoch rotiert");
        Ok(())
    }

    /// Schliesst ein Mitglied aus: Kick-Nachricht, Epoch +1, Verteilung
    ///
    /// Die Kick-Nachricht geht unter der ausgehenden Epoch raus, damit
    /// das restliche Team (und bestenfalls das Ziel) sie noch lesen kann.
    /// Durchgesetzt wird der Ausschluss allein durch die Rotation.
    pub fn mitglied_entfernen<P, T>(
        &mut self,
        service: &mut SecureChannelService<P, T>,
        ziel: MemberId,
        jetzt_ms: u64,
    ) -> Result<(), TeamError>
    where
        P: CryptoProvider,
        T: MeshTransport,
    {
        self.pruefe_leader()?;
        if let Err(fehler) = service.send_kick(ziel) {
            tracing::warn!(%fehler, ziel = %ziel, "Kick-Nachricht nicht gesendet");
        }
        self.mitglieder.retain(|m| *m != ziel);
        self.ausstehend.retain(|(m, _), _| *m != ziel);

        let psk_neu = zufalls_psk(service.provider());
        let (team_id, epoch_neu) = self.rotation_beginnen(service, &psk_neu, jetzt_ms)?;
        self.rotation_abschliessen(service, team_id, epoch_neu, &psk_neu)?;
        tracing::info!(ziel = %ziel, epoch = epoch_neu, "Mitglied entfernt, Epoch rotiert");
        Ok(())
    }

    /// Uebergibt die Leader-Rolle – ohne Rotation
    pub fn leader_uebertragen<P, T>(
        &mut self,
        service: &mut SecureChannelService<P, T>,
        ziel: MemberId,
    ) -> Result<(), TeamError>
    where
        P: CryptoProvider,
        T: MeshTransport,
    {
        self.pruefe_leader()?;
        service.send_transfer_leader(ziel)?;
        self.ist_leader = ziel == service.eigene_id();
        self.leader_id = Some(ziel);
        Ok(())
    }

    fn pruefe_leader(&self) -> Result<(), TeamError> {
        if self.widerrufen {
            return Err(TeamError::Widerrufen);
        }
        if !self.ist_leader {
            return Err(TeamError::NichtLeader);
        }
        Ok(())
    }

    /// Verschickt die Einzel-Zustellungen unter der ausgehenden Epoch
    fn rotation_beginnen<P, T>(
        &mut self,
        service: &mut SecureChannelService<P, T>,
        psk_neu: &Psk,
        jetzt_ms: u64,
    ) -> Result<(TeamId, u32), TeamError>
    where
        P: CryptoProvider,
        T: MeshTransport,
    {
        let (team_id, epoch_alt, alt) = {
            let ks = service.schluessel().ok_or(TeamError::KeinTeam)?;
            (ks.team_id, ks.epoch, ks.mgmt.clone())
        };
        let epoch_neu = epoch_alt + 1;
        let eigene = service.eigene_id();

        for mitglied in self.mitglieder.clone() {
            if mitglied == eigene {
                continue;
            }
            let gesendet = service
                .send_key_dist(mitglied, epoch_neu, psk_neu, &alt)
                .is_ok();
            if !gesendet {
                tracing::warn!(mitglied = %mitglied, "Erstzustellung fehlgeschlagen, Wiederholung folgt");
            }
            self.ausstehend.insert(
                (mitglied, epoch_neu),
                AusstehendeVerteilung {
                    psk: psk_neu.clone(),
                    unter_schluessel: alt.clone(),
                    versuche: gesendet as u8,
                    faellig_ms: jetzt_ms + self.konfig.resend_intervall_ms,
                },
            );
        }
        Ok((team_id, epoch_neu))
    }

    /// Schaltet lokal auf die neue Epoch um
    fn rotation_abschliessen<P, T>(
        &mut self,
        service: &mut SecureChannelService<P, T>,
        team_id: TeamId,
        epoch_neu: u32,
        psk_neu: &Psk,
    ) -> Result<(), TeamError>
    where
        P: CryptoProvider,
        T: MeshTransport,
    {
        let ks_neu = KeySet::aus_psk(service.provider(), team_id, epoch_neu, psk_neu)?;
        service.schluessel_installieren(ks_neu);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Periodischer Tick: Wiederholungen und Aufgabe
    // -----------------------------------------------------------------------

    /// Wiederholt faellige Zustellungen und gibt erschoepfte auf
    pub fn tick<P, T>(
        &mut self,
        service: &mut SecureChannelService<P, T>,
        senke: &mut dyn TeamEventSink,
        jetzt_ms: u64,
    ) where
        P: CryptoProvider,
        T: MeshTransport,
    {
        if self.widerrufen || self.ausstehend.is_empty() {
            return;
        }

        let faellig: Vec<(MemberId, u32)> = self
            .ausstehend
            .iter()
            .filter(|(_, a)| jetzt_ms >= a.faellig_ms)
            .map(|(k, _)| *k)
            .collect();

        for (mitglied, epoch) in faellig {
            let erschoepft = self
                .ausstehend
                .get(&(mitglied, epoch))
                .is_some_and(|a| a.versuche >= self.konfig.max_versuche);

            if erschoepft {
                self.ausstehend.remove(&(mitglied, epoch));
                tracing::warn!(
                    mitglied = %mitglied,
                    epoch,
                    "Schluessel-Zustellung aufgegeben"
                );
                let ctx = EventContext::new(
                    service.team_id().unwrap_or_default(),
                    epoch,
                    service.eigene_id(),
                    jetzt_ms,
                );
                senke.melden(&ctx, TeamEvent::KeyDistAufgegeben { mitglied, epoch });
                continue;
            }

            let (psk, unter) = match self.ausstehend.get(&(mitglied, epoch)) {
                Some(a) => (a.psk.clone(), a.unter_schluessel.clone()),
                None => continue,
            };
            if let Err(fehler) = service.send_key_dist(mitglied, epoch, &psk, &unter) {
                tracing::debug!(%fehler, mitglied = %mitglied, "Wiederholung fehlgeschlagen");
            }
            if let Some(a) = self.ausstehend.get_mut(&(mitglied, epoch)) {
                a.versuche += 1;
                a.faellig_ms = jetzt_ms + self.konfig.resend_intervall_ms;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Ereignis-Beobachtung: Bestaetigung und Widerrufs-Erkennung
    // -----------------------------------------------------------------------

    /// Wertet jedes Ereignis des Dienstes aus
    ///
    /// - Jede authentisierte Nachricht eines Mitglieds unter einer
    ///   ausstehenden Epoch bestaetigt dessen Zustellung implizit.
    /// - Wiederholte Authentisierungs-Fehler auf dem Management-Kanal des
    ///   eigenen Teams kippen die Mitglieds-Seite in den terminalen
    ///   Widerrufs-Zustand.
    pub fn beobachten<P, T>(
        &mut self,
        service: &mut SecureChannelService<P, T>,
        ctx: &EventContext,
        ereignis: &TeamEvent,
        senke: &mut dyn TeamEventSink,
    ) where
        P: CryptoProvider,
        T: MeshTransport,
    {
        if self.widerrufen {
            return;
        }

        match ereignis {
            TeamEvent::Fehler { fehler, kanal } => {
                let betrifft_uns = service.team_id() == Some(ctx.team_id);
                let zaehlt = *kanal == TeamChannel::Management
                    && betrifft_uns
                    && matches!(
                        fehler,
                        ReceiveFailure::Entschluesselung | ReceiveFailure::SchluesselMismatch
                    );
                if zaehlt {
                    self.fehlversuche += 1;
                    tracing::debug!(
                        fehlversuche = self.fehlversuche,
                        schwelle = self.konfig.widerruf_schwelle,
                        "Authentisierungs-Fehler auf Management-Kanal"
                    );
                    if !self.ist_leader && self.fehlversuche >= self.konfig.widerruf_schwelle {
                        self.widerruf_ausloesen(service, ctx, senke);
                    }
                }
            }
            TeamEvent::Kick(kick) => {
                if kick.target == service.eigene_id() {
                    // Informative Kick-Nachricht an uns selbst: sofort
                    // raus, ohne auf die Fehlversuchs-Schwelle zu warten
                    self.widerruf_ausloesen(service, ctx, senke);
                    return;
                }
                self.mitglieder.retain(|m| *m != kick.target);
                self.bestaetigen(ctx);
            }
            TeamEvent::TransferLeader(uebergabe) => {
                self.ist_leader = uebergabe.target == service.eigene_id();
                self.leader_id = Some(uebergabe.target);
                self.bestaetigen(ctx);
            }
            TeamEvent::JoinConfirm(_) => {
                // Mitglied wird erst durch die explizite Annahme Teil der
                // Liste; hier zaehlt nur die implizite Bestaetigung
                self.bestaetigen(ctx);
            }
            TeamEvent::Status(status) => {
                if let Some(roster) = &status.roster {
                    if !self.ist_leader {
                        self.leader_id = Some(roster.leader_id);
                        self.mitglieder = roster.mitglieder.clone();
                    }
                }
                self.bestaetigen(ctx);
            }
            // Klartext-Typen laufen vor der Schluessel-Etablierung und
            // bestaetigen nichts
            TeamEvent::Advertise(_) | TeamEvent::JoinRequest(_) => {}
            _ => self.bestaetigen(ctx),
        }
    }

    /// Implizite Bestaetigung: authentisierter Verkehr unter neuer Epoch
    fn bestaetigen(&mut self, ctx: &EventContext) {
        self.fehlversuche = 0;
        if self.ausstehend.remove(&(ctx.from, ctx.epoch)).is_some() {
            tracing::debug!(
                mitglied = %ctx.from,
                epoch = ctx.epoch,
                "Schluessel-Zustellung implizit bestaetigt"
            );
        }
    }

    fn widerruf_ausloesen<P, T>(
        &mut self,
        service: &mut SecureChannelService<P, T>,
        ctx: &EventContext,
        senke: &mut dyn TeamEventSink,
    ) where
        P: CryptoProvider,
        T: MeshTransport,
    {
        tracing::warn!("Zugriff auf das Team widerrufen, Schluessel werden geleert");
        self.widerrufen = true;
        self.ausstehend.clear();
        service.schluessel_loeschen();
        senke.melden(ctx, TeamEvent::ZugriffWiderrufen);
    }
}

impl Default for KeyRotationPolicy {
    fn default() -> Self {
        Self::neu(RotationsKonfig::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::SammelSenke;
    use crate::transport::{MeshEingang, MeshZiel};
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

    type Dienst = SecureChannelService<Aes256GcmProvider, TestFunk>;

    fn leader_mit_team(mitglieder: &[u32]) -> (Dienst, KeyRotationPolicy) {
        let mut dienst = SecureChannelService::neu(Aes256GcmProvider, TestFunk::default(), MemberId(1));
        let mut policy = KeyRotationPolicy::default();
        policy.team_erstellen(&mut dienst, TeamId([5; 8])).unwrap();
        for m in mitglieder {
            policy.mitglieder.push(MemberId(*m));
        }
        (dienst, policy)
    }

    fn ctx(team: TeamId, epoch: u32, from: u32) -> EventContext {
        EventContext::new(team, epoch, MemberId(from), 0)
    }

    #[test]
    fn team_erstellen_setzt_epoch_1_und_leader() {
        let (dienst, policy) = leader_mit_team(&[]);
        assert_eq!(dienst.epoch(), Some(1));
        assert!(policy.ist_leader());
        assert_eq!(policy.mitglieder(), &[MemberId(1)]);
    }

    #[test]
    fn aufnahme_rotiert_um_genau_eins_und_verteilt() {
        let (mut dienst, mut policy) = leader_mit_team(&[2, 3]);
        policy
            .mitglied_aufnehmen(&mut dienst, MemberId(4), 0xEE, 1_000)
            .unwrap();

        assert_eq!(dienst.epoch(), Some(2));
        // Bestandsmitglieder 2 und 3 plus der Beitretende 4
        assert_eq!(policy.ausstehende_zustellungen(), 3);
        assert!(policy.mitglieder().contains(&MemberId(4)));

        // Drei Unicast-KeyDists plus die JoinAccept-Annahme an 4
        let unicasts = dienst
            .transport
            .gesendet
            .iter()
            .filter(|(_, _, _, ziel, _)| matches!(ziel, MeshZiel::Knoten(_)))
            .count();
        assert_eq!(unicasts, 4);
    }

    #[test]
    fn kick_rotiert_und_verteilt_nicht_an_das_ziel() {
        let (mut dienst, mut policy) = leader_mit_team(&[2, 3]);
        policy
            .mitglied_entfernen(&mut dienst, MemberId(3), 1_000)
            .unwrap();

        assert_eq!(dienst.epoch(), Some(2));
        assert!(!policy.mitglieder().contains(&MemberId(3)));
        // Nur Mitglied 2 bekommt das neue Material
        assert_eq!(policy.ausstehende_zustellungen(), 1);
        let an_drei = dienst
            .transport
            .gesendet
            .iter()
            .filter(|(_, _, _, ziel, _)| *ziel == MeshZiel::Knoten(MemberId(3)))
            .count();
        assert_eq!(an_drei, 0);
    }

    #[test]
    fn leader_uebergabe_rotiert_nicht() {
        let (mut dienst, mut policy) = leader_mit_team(&[2]);
        policy
            .leader_uebertragen(&mut dienst, MemberId(2))
            .unwrap();
        assert_eq!(dienst.epoch(), Some(1));
        assert!(!policy.ist_leader());
        assert_eq!(policy.leader_id(), Some(MemberId(2)));
    }

    #[test]
    fn nicht_leader_darf_nicht_rotieren() {
        let mut dienst = SecureChannelService::neu(Aes256GcmProvider, TestFunk::default(), MemberId(2));
        let mut policy = KeyRotationPolicy::default();
        policy
            .schluessel_uebernehmen(
                &mut dienst,
                TeamId([5; 8]),
                1,
                &Psk::aus_slice(&[1; 16]).unwrap(),
                MemberId(1),
            )
            .unwrap();
        let err = policy
            .mitglied_aufnehmen(&mut dienst, MemberId(9), 0, 0)
            .unwrap_err();
        assert!(matches!(err, TeamError::NichtLeader));
    }

    #[test]
    fn tick_wiederholt_faellige_zustellungen() {
        let (mut dienst, mut policy) = leader_mit_team(&[]);
        policy
            .mitglied_aufnehmen(&mut dienst, MemberId(2), 0, 0)
            .unwrap();
        let vorher = dienst.transport.gesendet.len();

        let mut senke = SammelSenke::neu();
        // Noch nicht faellig
        policy.tick(&mut dienst, &mut senke, 4_999);
        assert_eq!(dienst.transport.gesendet.len(), vorher);
        // Faellig
        policy.tick(&mut dienst, &mut senke, 5_000);
        assert_eq!(dienst.transport.gesendet.len(), vorher + 1);
    }

    #[test]
    fn zustellung_wird_nach_max_versuchen_aufgegeben() {
        let (mut dienst, mut policy) = leader_mit_team(&[2]);
        policy
            .mitglied_aufnehmen(&mut dienst, MemberId(3), 0, 0)
            .unwrap();

        let mut senke = SammelSenke::neu();
        let mut jetzt = 0;
        // Bis zur Erschoepfung ticken
        for _ in 0..10 {
            jetzt += 5_000;
            policy.tick(&mut dienst, &mut senke, jetzt);
        }

        assert_eq!(policy.ausstehende_zustellungen(), 0);
        let aufgegeben = senke
            .ereignisse
            .iter()
            .filter(|(_, e)| {
                matches!(
                    e,
                    TeamEvent::KeyDistAufgegeben {
                        mitglied: MemberId(2),
                        epoch: 2
                    }
                )
            })
            .count();
        assert_eq!(aufgegeben, 1);
    }

    #[test]
    fn authentisierte_nachricht_bestaetigt_zustellung_implizit() {
        let (mut dienst, mut policy) = leader_mit_team(&[]);
        policy
            .mitglied_aufnehmen(&mut dienst, MemberId(2), 0, 0)
            .unwrap();
        assert_eq!(policy.ausstehende_zustellungen(), 1);

        // Mitglied 2 meldet sich unter der neuen Epoch 2
        let team = dienst.team_id().unwrap();
        let mut senke = SammelSenke::neu();
        policy.beobachten(
            &mut dienst,
            &ctx(team, 2, 2),
            &TeamEvent::Position { daten: vec![] },
            &mut senke,
        );
        assert_eq!(policy.ausstehende_zustellungen(), 0);

        // Danach wird nichts mehr wiederholt
        policy.tick(&mut dienst, &mut senke, 1_000_000);
        assert_eq!(policy.ausstehende_zustellungen(), 0);
    }

    #[test]
    fn wiederholte_fehlversuche_loesen_widerruf_aus() {
        let mut dienst = SecureChannelService::neu(Aes256GcmProvider, TestFunk::default(), MemberId(2));
        let mut policy = KeyRotationPolicy::default();
        let team = TeamId([5; 8]);
        policy
            .schluessel_uebernehmen(
                &mut dienst,
                team,
                1,
                &Psk::aus_slice(&[1; 16]).unwrap(),
                MemberId(1),
            )
            .unwrap();

        let mut senke = SammelSenke::neu();
        let fehler = TeamEvent::Fehler {
            fehler: ReceiveFailure::Entschluesselung,
            kanal: TeamChannel::Management,
        };
        for _ in 0..8 {
            policy.beobachten(&mut dienst, &ctx(team, 1, 1), &fehler, &mut senke);
        }

        assert!(policy.ist_widerrufen());
        assert!(!dienst.hat_schluessel());
        assert!(senke
            .ereignisse
            .iter()
            .any(|(_, e)| matches!(e, TeamEvent::ZugriffWiderrufen)));
    }

    #[test]
    fn erfolgreicher_verkehr_setzt_fehlversuche_zurueck() {
        let mut dienst = SecureChannelService::neu(Aes256GcmProvider, TestFunk::default(), MemberId(2));
        let mut policy = KeyRotationPolicy::default();
        let team = TeamId([5; 8]);
        policy
            .schluessel_uebernehmen(
                &mut dienst,
                team,
                1,
                &Psk::aus_slice(&[1; 16]).unwrap(),
                MemberId(1),
            )
            .unwrap();

        let mut senke = SammelSenke::neu();
        let fehler = TeamEvent::Fehler {
            fehler: ReceiveFailure::Entschluesselung,
            kanal: TeamChannel::Management,
        };
        for _ in 0..7 {
            policy.beobachten(&mut dienst, &ctx(team, 1, 1), &fehler, &mut senke);
        }
        // Ein erfolgreich entschluesseltes Paket dazwischen
        policy.beobachten(
            &mut dienst,
            &ctx(team, 1, 1),
            &TeamEvent::Chat { daten: vec![] },
            &mut senke,
        );
        for _ in 0..7 {
            policy.beobachten(&mut dienst, &ctx(team, 1, 1), &fehler, &mut senke);
        }
        assert!(!policy.ist_widerrufen());
    }

    #[test]
    fn fremde_teams_zaehlen_nicht_fuer_den_widerruf() {
        let mut dienst = SecureChannelService::neu(Aes256GcmProvider, TestFunk::default(), MemberId(2));
        let mut policy = KeyRotationPolicy::default();
        policy
            .schluessel_uebernehmen(
                &mut dienst,
                TeamId([5; 8]),
                1,
                &Psk::aus_slice(&[1; 16]).unwrap(),
                MemberId(1),
            )
            .unwrap();

        let mut senke = SammelSenke::neu();
        let fehler = TeamEvent::Fehler {
            fehler: ReceiveFailure::SchluesselMismatch,
            kanal: TeamChannel::Management,
        };
        for _ in 0..20 {
            policy.beobachten(&mut dienst, &ctx(TeamId([9; 8]), 1, 7), &fehler, &mut senke);
        }
        assert!(!policy.ist_widerrufen());
    }

    #[test]
    fn kick_an_uns_selbst_leert_sofort() {
        let mut dienst = SecureChannelService::neu(Aes256GcmProvider, TestFunk::default(), MemberId(2));
        let mut policy = KeyRotationPolicy::default();
        let team = TeamId([5; 8]);
        policy
            .schluessel_uebernehmen(
                &mut dienst,
                team,
                1,
                &Psk::aus_slice(&[1; 16]).unwrap(),
                MemberId(1),
            )
            .unwrap();

        let mut senke = SammelSenke::neu();
        policy.beobachten(
            &mut dienst,
            &ctx(team, 1, 1),
            &TeamEvent::Kick(teamfunk_protocol::message::Kick {
                target: MemberId(2),
            }),
            &mut senke,
        );
        assert!(policy.ist_widerrufen());
        assert!(!dienst.hat_schluessel());
    }

    #[test]
    fn leader_uebergabe_an_uns_macht_uns_zum_leader() {
        let mut dienst = SecureChannelService::neu(Aes256GcmProvider, TestFunk::default(), MemberId(2));
        let mut policy = KeyRotationPolicy::default();
        let team = TeamId([5; 8]);
        policy
            .schluessel_uebernehmen(
                &mut dienst,
                team,
                1,
                &Psk::aus_slice(&[1; 16]).unwrap(),
                MemberId(1),
            )
            .unwrap();
        assert!(!policy.ist_leader());

        let mut senke = SammelSenke::neu();
        policy.beobachten(
            &mut dienst,
            &ctx(team, 1, 1),
            &TeamEvent::TransferLeader(teamfunk_protocol::message::TransferLeader {
                target: MemberId(2),
            }),
            &mut senke,
        );
        assert!(policy.ist_leader());
    }
}
