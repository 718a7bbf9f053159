//! Sicherer Team-Kanal – der Orchestrator
//!
//! Entschluesselt und validiert eingehende Frames, verteilt dekodierte
//! Ereignisse an die Senke und verschluesselt ausgehende Kommandos.
//! Der einzige veraenderliche Zustand ist der aktuelle `KeySet`; darueber
//! hinaus gibt es keine Seiteneffekte ausser Ereignissen und Funk-Bytes.
//!
//! ## Pruefreihenfolge eingehender Frames
//!
//! 1. Struktur-Dekodierung (kaputte Bytes werden still verworfen)
//! 2. Versions-Pruefung
//! 3. Lokaler Vertrauens-Check (Team-ID + Epoch)
//! 4. AEAD-Entschluesselung
//! 5. Dekodierung und Dispatch der inneren Nachricht
//!
//! Advertise und JoinRequest werden im Klartext akzeptiert, weil sie
//! konstruktionsbedingt vor der Schluessel-Etablierung laufen. Alle
//! anderen Management-Typen werden bei fehlgeschlagener Entschluesselung
//! still verworfen – ueber das Warum wird nichts preisgegeben.

use teamfunk_core::{EventContext, MemberId, Psk, TeamId};
use teamfunk_crypto::{CryptoProvider, KeySet, SecretBytes};
use teamfunk_protocol::envelope::AadFlags;
use teamfunk_protocol::message::{
    Advertise, JoinAccept, JoinConfirm, JoinDecision, JoinRequest, KeyDist, Kick, Status,
    TransferLeader,
};
use teamfunk_protocol::{EncryptedEnvelope, ManagementMessage, TeamChannel, ENVELOPE_VERSION, PORT_TEAM};

use crate::error::{SendError, SendResult};
use crate::event::{ReceiveFailure, TeamEvent, TeamEventSink};
use crate::transport::{MeshEingang, MeshTransport, MeshZiel};

/// Orchestrator fuer den verschluesselten Team-Verkehr
pub struct SecureChannelService<P, T>
where
    P: CryptoProvider,
    T: MeshTransport,
{
    provider: P,
    pub(crate) transport: T,
    pub(crate) eigene_id: MemberId,
    schluessel: Option<KeySet>,
}

impl<P, T> SecureChannelService<P, T>
where
    P: CryptoProvider,
    T: MeshTransport,
{
    pub fn neu(provider: P, transport: T, eigene_id: MemberId) -> Self {
        Self {
            provider,
            transport,
            eigene_id,
            schluessel: None,
        }
    }

    // -----------------------------------------------------------------------
    // Schluessel-Verwaltung
    // -----------------------------------------------------------------------

    /// Ersetzt den Schluesselsatz als Ganzes (atomarer Tausch)
    pub fn schluessel_installieren(&mut self, neu: KeySet) {
        if let Some(alt) = &mut self.schluessel {
            alt.leeren();
        }
        tracing::info!(team = %neu.team_id, epoch = neu.epoch, "Schluesselsatz installiert");
        self.schluessel = Some(neu);
    }

    /// Leert und entfernt den Schluesselsatz (Leave/Kick/Widerruf)
    pub fn schluessel_loeschen(&mut self) {
        if let Some(ks) = &mut self.schluessel {
            ks.leeren();
        }
        self.schluessel = None;
    }

    /// Gibt den aktuellen Schluesselsatz zurueck
    pub fn schluessel(&self) -> Option<&KeySet> {
        self.schluessel.as_ref().filter(|ks| ks.gueltig)
    }

    pub fn hat_schluessel(&self) -> bool {
        self.schluessel().is_some()
    }

    pub fn epoch(&self) -> Option<u32> {
        self.schluessel().map(|ks| ks.epoch)
    }

    pub fn team_id(&self) -> Option<TeamId> {
        self.schluessel().map(|ks| ks.team_id)
    }

    pub fn eigene_id(&self) -> MemberId {
        self.eigene_id
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    // -----------------------------------------------------------------------
    // Empfang
    // -----------------------------------------------------------------------

    /// Leert die Eingangs-Queue des Mesh-Transports
    ///
    /// Pro dekodiertem Ereignis wird die Senke genau einmal aufgerufen.
    /// Jeder Pruef-Fehlschlag ist terminal fuer das einzelne Paket.
    pub fn process_incoming(&mut self, senke: &mut dyn TeamEventSink, jetzt_ms: u64) {
        while let Some(eingang) = self.transport.poll_eingang() {
            self.verarbeite_frame(eingang, senke, jetzt_ms);
        }
    }

    fn verarbeite_frame(
        &mut self,
        eingang: MeshEingang,
        senke: &mut dyn TeamEventSink,
        jetzt_ms: u64,
    ) {
        if eingang.portnum != PORT_TEAM {
            return;
        }
        if eingang.from == self.eigene_id {
            // Eigenes Echo aus dem Funknetz
            return;
        }
        let Some(kanal) = TeamChannel::from_u8(eingang.kanal) else {
            tracing::trace!(kanal = eingang.kanal, "Unbekannter Kanal, Paket verworfen");
            return;
        };

        // Schritt 1: Struktur-Dekodierung
        let umschlag = match EncryptedEnvelope::decode(&eingang.payload) {
            Ok(u) => u,
            Err(fehler) => {
                tracing::debug!(%fehler, from = %eingang.from, "Kaputter Umschlag verworfen");
                return;
            }
        };

        let ctx = EventContext::new(umschlag.team_id, umschlag.epoch, eingang.from, jetzt_ms);

        // Schritt 2: Versions-Pruefung
        if umschlag.version != ENVELOPE_VERSION {
            senke.melden(
                &ctx,
                TeamEvent::Fehler {
                    fehler: ReceiveFailure::UnbekannteVersion,
                    kanal,
                },
            );
            return;
        }

        // Klartext-Pfad: nur Advertise/JoinRequest, nur Management-Kanal
        if umschlag.ist_klartext() {
            if kanal == TeamChannel::Management {
                self.verarbeite_klartext(&umschlag, &ctx, senke);
            }
            return;
        }

        // Schritt 3: Lokaler Vertrauens-Check (Team-ID + Epoch)
        let Some(ks) = self.schluessel() else {
            senke.melden(
                &ctx,
                TeamEvent::Fehler {
                    fehler: ReceiveFailure::SchluesselMismatch,
                    kanal,
                },
            );
            return;
        };

        // Fuer Ankuendigungen auf dem Management-Kanal wird waehrend der
        // Rotations-Uebergabe auch die unmittelbar naechste Epoch
        // akzeptiert; entschluesselt wird sie mit dem noch vertrauten
        // Management-Schluessel.
        let uebergabe =
            kanal == TeamChannel::Management && umschlag.epoch == ks.epoch.wrapping_add(1);
        let vertraut = umschlag.team_id == ks.team_id && (umschlag.epoch == ks.epoch || uebergabe);
        if !vertraut {
            senke.melden(
                &ctx,
                TeamEvent::Fehler {
                    fehler: ReceiveFailure::SchluesselMismatch,
                    kanal,
                },
            );
            return;
        }

        // Schritt 4: AEAD-Entschluesselung
        let kanal_schluessel = ks.kanal_schluessel(kanal);
        let klartext = match self.provider.aead_decrypt(
            kanal_schluessel,
            &umschlag.nonce,
            &umschlag.aad(),
            &umschlag.ciphertext,
        ) {
            Ok(k) => k,
            Err(_) => {
                senke.melden(
                    &ctx,
                    TeamEvent::Fehler {
                        fehler: ReceiveFailure::Entschluesselung,
                        kanal,
                    },
                );
                return;
            }
        };

        // Schritt 5: Innere Nachricht dekodieren und dispatchen
        match kanal {
            TeamChannel::Management => self.verarbeite_management(&klartext, &ctx, senke),
            TeamChannel::Position => {
                senke.melden(&ctx, TeamEvent::Position { daten: klartext })
            }
            TeamChannel::Waypoint => {
                senke.melden(&ctx, TeamEvent::Waypoint { daten: klartext })
            }
            TeamChannel::Chat => senke.melden(&ctx, TeamEvent::Chat { daten: klartext }),
            TeamChannel::Track => senke.melden(&ctx, TeamEvent::Track { daten: klartext }),
        }
    }

    fn verarbeite_klartext(
        &mut self,
        umschlag: &EncryptedEnvelope,
        ctx: &EventContext,
        senke: &mut dyn TeamEventSink,
    ) {
        let nachricht = match ManagementMessage::decode(&umschlag.ciphertext) {
            Ok(n) => n,
            Err(fehler) => {
                tracing::debug!(%fehler, "Kaputte Klartext-Nachricht verworfen");
                return;
            }
        };
        if !nachricht.typ().ist_klartext_erlaubt() {
            tracing::warn!(
                typ = ?nachricht.typ(),
                from = %ctx.from,
                "Klartext-Frame mit verschluesseltem Nachrichtentyp verworfen"
            );
            return;
        }
        match nachricht {
            ManagementMessage::Advertise(p) => senke.melden(ctx, TeamEvent::Advertise(p)),
            ManagementMessage::JoinRequest(p) => senke.melden(ctx, TeamEvent::JoinRequest(p)),
            _ => unreachable!("ist_klartext_erlaubt deckt genau diese Typen ab"),
        }
    }

    fn verarbeite_management(
        &mut self,
        klartext: &[u8],
        ctx: &EventContext,
        senke: &mut dyn TeamEventSink,
    ) {
        let nachricht = match ManagementMessage::decode(klartext) {
            Ok(n) => n,
            Err(fehler) => {
                tracing::debug!(%fehler, from = %ctx.from, "Innere Nachricht nicht dekodierbar");
                return;
            }
        };

        match nachricht {
            ManagementMessage::KeyDist(kd) => {
                if self.uebernehme_schluesselmaterial(kd.team_id, kd.epoch, &kd.psk) {
                    senke.melden(ctx, TeamEvent::KeyDist { epoch: kd.epoch });
                }
            }
            ManagementMessage::JoinAccept(ja) => {
                // Fuer bestehende Mitglieder ist das JoinAccept zugleich
                // die Rotations-Ankuendigung mit dem neuen Material.
                let uebernommen =
                    self.uebernehme_schluesselmaterial(ja.team_id, ja.epoch, &ja.psk);
                let aktuell = self.epoch() == Some(ja.epoch);
                if uebernommen || aktuell {
                    senke.melden(
                        ctx,
                        TeamEvent::JoinAccept {
                            epoch: ja.epoch,
                            nonce_echo: ja.nonce_echo,
                        },
                    );
                }
            }
            ManagementMessage::JoinConfirm(p) => senke.melden(ctx, TeamEvent::JoinConfirm(p)),
            ManagementMessage::JoinDecision(p) => senke.melden(ctx, TeamEvent::JoinDecision(p)),
            ManagementMessage::Kick(p) => senke.melden(ctx, TeamEvent::Kick(p)),
            ManagementMessage::TransferLeader(p) => {
                senke.melden(ctx, TeamEvent::TransferLeader(p))
            }
            ManagementMessage::Status(p) => senke.melden(ctx, TeamEvent::Status(p)),
            ManagementMessage::Advertise(p) => senke.melden(ctx, TeamEvent::Advertise(p)),
            ManagementMessage::JoinRequest(p) => senke.melden(ctx, TeamEvent::JoinRequest(p)),
        }
    }

    /// Uebernimmt Schluesselmaterial einer Rotations-Ankuendigung
    ///
    /// Bereits vertrautes oder aelteres Material ist ein No-Op (idempotente
    /// Wiederzustellung); uebersprungene Epochen werden abgelehnt. Gibt
    /// `true` zurueck wenn ein neuer Satz installiert wurde.
    fn uebernehme_schluesselmaterial(&mut self, team_id: TeamId, epoch: u32, psk: &Psk) -> bool {
        let Some(ks) = self.schluessel() else {
            return false;
        };
        if team_id != ks.team_id {
            tracing::warn!(%team_id, "Schluesselmaterial fuer fremdes Team verworfen");
            return false;
        }
        if epoch <= ks.epoch {
            tracing::debug!(epoch, aktuell = ks.epoch, "Bereits bekanntes Schluesselmaterial");
            return false;
        }
        if epoch != ks.epoch + 1 {
            tracing::warn!(epoch, aktuell = ks.epoch, "Epoch-Sprung abgelehnt");
            return false;
        }
        match KeySet::aus_psk(&self.provider, team_id, epoch, psk) {
            Ok(neu) => {
                self.schluessel_installieren(neu);
                true
            }
            Err(fehler) => {
                tracing::error!(%fehler, "Schluessel-Ableitung fehlgeschlagen");
                false
            }
        }
    }

    // -----------------------------------------------------------------------
    // Senden
    // -----------------------------------------------------------------------

    /// Sendet eine Team-Ankuendigung (Klartext, Broadcast)
    pub fn send_advertise(&mut self, ankuendigung: Advertise) -> SendResult {
        let team_id = ankuendigung.team_id;
        self.sende_klartext(ManagementMessage::Advertise(ankuendigung), team_id)
    }

    /// Sendet eine Beitritts-Anfrage (Klartext, Broadcast)
    pub fn send_join_request(&mut self, anfrage: JoinRequest) -> SendResult {
        let team_id = anfrage.team_id;
        self.sende_klartext(ManagementMessage::JoinRequest(anfrage), team_id)
    }

    /// Sendet eine Beitritts-Bestaetigung (verschluesselt, Broadcast)
    pub fn send_join_confirm(&mut self, bestaetigung: JoinConfirm) -> SendResult {
        self.sende_mgmt(
            ManagementMessage::JoinConfirm(bestaetigung),
            MeshZiel::Broadcast,
            false,
        )
    }

    /// Sendet eine Beitritts-Entscheidung (verschluesselt, Broadcast)
    pub fn send_join_decision(&mut self, entscheidung: JoinDecision) -> SendResult {
        self.sende_mgmt(
            ManagementMessage::JoinDecision(entscheidung),
            MeshZiel::Broadcast,
            false,
        )
    }

    /// Sendet einen Ausschluss (verschluesselt, Broadcast)
    pub fn send_kick(&mut self, target: MemberId) -> SendResult {
        self.sende_mgmt(
            ManagementMessage::Kick(Kick { target }),
            MeshZiel::Broadcast,
            false,
        )
    }

    /// Sendet eine Leader-Uebergabe (verschluesselt, Broadcast)
    pub fn send_transfer_leader(&mut self, target: MemberId) -> SendResult {
        self.sende_mgmt(
            ManagementMessage::TransferLeader(TransferLeader { target }),
            MeshZiel::Broadcast,
            false,
        )
    }

    /// Sendet einen Team-Status (verschluesselt, Broadcast)
    pub fn send_status(&mut self, status: Status) -> SendResult {
        self.sende_mgmt(ManagementMessage::Status(status), MeshZiel::Broadcast, false)
    }

    /// Sendet Schluesselmaterial einer neuen Epoch an ein Mitglied
    ///
    /// Der Umschlag traegt die *neue* Epoch, verschluesselt wird unter dem
    /// Management-Schluessel der *ausgehenden* Epoch – so ist die
    /// Ankuendigung unter Material authentisiert dem der Empfaenger
    /// bereits vertraut.
    pub fn send_key_dist(
        &mut self,
        ziel: MemberId,
        epoch_neu: u32,
        psk: &Psk,
        ausgehender_schluessel: &SecretBytes,
    ) -> SendResult {
        let Some(team_id) = self.team_id() else {
            return Err(SendError::SchluesselFehlen);
        };
        let nachricht = ManagementMessage::KeyDist(KeyDist {
            team_id,
            epoch: epoch_neu,
            psk: psk.clone(),
        });
        self.sende_mgmt_unter(
            nachricht,
            team_id,
            epoch_neu,
            ausgehender_schluessel,
            MeshZiel::Knoten(ziel),
            true,
        )
    }

    /// Sendet die Beitritts-Annahme an den Beitretenden (verschluesselt,
    /// Unicast, unter dem aktuellen Schluesselsatz)
    pub fn send_join_accept(&mut self, annahme: JoinAccept, ziel: MemberId) -> SendResult {
        self.sende_mgmt(
            ManagementMessage::JoinAccept(annahme),
            MeshZiel::Knoten(ziel),
            true,
        )
    }

    /// Sendet eine Positionsmeldung (verschluesselt, Broadcast)
    pub fn send_position(&mut self, daten: &[u8]) -> SendResult {
        self.sende_kanal(TeamChannel::Position, daten)
    }

    /// Sendet einen Wegpunkt (verschluesselt, Broadcast)
    pub fn send_waypoint(&mut self, daten: &[u8]) -> SendResult {
        self.sende_kanal(TeamChannel::Waypoint, daten)
    }

    /// Sendet eine Chat-Nachricht (verschluesselt, Broadcast)
    pub fn send_chat(&mut self, daten: &[u8]) -> SendResult {
        self.sende_kanal(TeamChannel::Chat, daten)
    }

    /// Sendet Track-Telemetrie (verschluesselt, Broadcast)
    pub fn send_track(&mut self, daten: &[u8]) -> SendResult {
        self.sende_kanal(TeamChannel::Track, daten)
    }

    fn sende_klartext(&mut self, nachricht: ManagementMessage, team_id: TeamId) -> SendResult {
        let klar = nachricht.encode()?;
        let umschlag = EncryptedEnvelope::neu(AadFlags::KLARTEXT, 0, team_id, [0u8; 12], klar);
        let bytes = umschlag.encode()?;
        if !self.transport.senden(
            TeamChannel::Management.as_u8(),
            PORT_TEAM,
            &bytes,
            MeshZiel::Broadcast,
            false,
        ) {
            return Err(SendError::MeshVersand);
        }
        Ok(())
    }

    fn sende_mgmt(
        &mut self,
        nachricht: ManagementMessage,
        ziel: MeshZiel,
        want_ack: bool,
    ) -> SendResult {
        let Some(ks) = self.schluessel() else {
            return Err(SendError::SchluesselFehlen);
        };
        let team_id = ks.team_id;
        let epoch = ks.epoch;
        let schluessel = ks.mgmt.clone();
        self.sende_mgmt_unter(nachricht, team_id, epoch, &schluessel, ziel, want_ack)
    }

    fn sende_mgmt_unter(
        &mut self,
        nachricht: ManagementMessage,
        team_id: TeamId,
        epoch: u32,
        schluessel: &SecretBytes,
        ziel: MeshZiel,
        want_ack: bool,
    ) -> SendResult {
        let klar = nachricht.encode()?;
        self.sende_verschluesselt(
            TeamChannel::Management,
            team_id,
            epoch,
            schluessel,
            &klar,
            ziel,
            want_ack,
        )
    }

    fn sende_kanal(&mut self, kanal: TeamChannel, daten: &[u8]) -> SendResult {
        let Some(ks) = self.schluessel() else {
            return Err(SendError::SchluesselFehlen);
        };
        let team_id = ks.team_id;
        let epoch = ks.epoch;
        let schluessel = ks.kanal_schluessel(kanal).clone();
        self.sende_verschluesselt(
            kanal,
            team_id,
            epoch,
            &schluessel,
            daten,
            MeshZiel::Broadcast,
            false,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn sende_verschluesselt(
        &mut self,
        kanal: TeamChannel,
        team_id: TeamId,
        epoch: u32,
        schluessel: &SecretBytes,
        klartext: &[u8],
        ziel: MeshZiel,
        want_ack: bool,
    ) -> SendResult {
        let nonce = self.provider.frische_nonce();
        let mut umschlag = EncryptedEnvelope::neu(0, epoch, team_id, nonce, Vec::new());
        umschlag.ciphertext = self
            .provider
            .aead_encrypt(schluessel, &nonce, &umschlag.aad(), klartext)
            .map_err(|_| SendError::Verschluesselung)?;
        let bytes = umschlag.encode()?;
        if !self
            .transport
            .senden(kanal.as_u8(), PORT_TEAM, &bytes, ziel, want_ack)
        {
            return Err(SendError::MeshVersand);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
