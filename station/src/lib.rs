//! Teamfunk Station – Kompositions-Root
//!
//! Verdrahtet den sicheren Team-Kanal, die Rotations-Richtlinie und den
//! Pairing-Handshake mit den UDP-Traegern und treibt alles aus einer
//! kooperativen Poll-Schleife. Genau eine Instanz pro Prozess wird hier
//! konstruiert und explizit verdrahtet – es gibt keine statischen
//! Dienst-Zeiger.

pub mod config;
pub mod funk;

use base64::Engine as _;
use rand::rngs::OsRng;
use rand::RngCore;
use teamfunk_core::{EventContext, MemberId, Psk, TeamId, TeamfunkError};
use teamfunk_crypto::Aes256GcmProvider;
use teamfunk_pairing::{
    LeaderPairing, LeaderZustand, MemberPairing, MemberZustand, PairingAngebot,
};
use teamfunk_protocol::message::StatusParams;
use teamfunk_team::{SammelSenke, SecureChannelService, TeamCommander, TeamEvent};

use crate::config::{StationKonfig, StationsRolle};
use crate::funk::{UdpBootstrapFunk, UdpMeshFunk};

/// Die komplette, verdrahtete Station
pub struct Station {
    konfig: StationKonfig,
}

impl Station {
    pub fn neu(konfig: StationKonfig) -> Self {
        Self { konfig }
    }

    /// Startet die Station und blockiert bis Ctrl-C
    pub async fn starten(self) -> anyhow::Result<()> {
        let konfig = self.konfig;

        let eigene_id = if konfig.station.member_id != 0 {
            MemberId::new(konfig.station.member_id)
        } else {
            MemberId::new(OsRng.next_u32())
        };
        tracing::info!(id = %eigene_id, name = %konfig.station.name, "Station startet");

        // Transporte
        let mesh = UdpMeshFunk::neu(
            &konfig.netzwerk.bind_adresse,
            &konfig.netzwerk.broadcast_adresse,
            konfig.netzwerk.mesh_port,
            eigene_id,
        )
        .await?;

        // Team-Kanal
        let service = SecureChannelService::neu(Aes256GcmProvider, mesh, eigene_id);
        let mut kommandant = TeamCommander::neu(service, konfig.rotation);

        // Pairing-Zustandsmaschinen
        let mut leader_pairing: Option<LeaderPairing<UdpBootstrapFunk>> = None;
        let mut member_pairing: Option<MemberPairing<UdpBootstrapFunk>> = None;

        let jetzt = jetzt_ms();
        if let Some(psk) = vorverteilter_psk(&konfig)? {
            // Vorverteiltes Material: Pairing entfaellt komplett
            let team_id = vorverteilte_team_id(&konfig)?;
            kommandant.schluessel_uebernehmen(
                team_id,
                konfig.team.epoch,
                &psk,
                MemberId::new(konfig.team.leader_id),
            )?;
            tracing::info!(%team_id, epoch = konfig.team.epoch, "Vorverteilter PSK uebernommen");
        } else {
            let bootstrap = UdpBootstrapFunk::neu(
                &konfig.netzwerk.bind_adresse,
                &konfig.netzwerk.broadcast_adresse,
                konfig.netzwerk.pairing_port,
            )
            .await?;
            match konfig.station.rolle {
                StationsRolle::Leader => {
                    let team_id = kommandant.team_erstellen(&konfig.team.name)?;
                    let mut pairing = LeaderPairing::neu(bootstrap, konfig.pairing);
                    pairing.starten(
                        pairing_angebot(&kommandant, team_id)?,
                        jetzt,
                    );
                    leader_pairing = Some(pairing);
                }
                StationsRolle::Mitglied => {
                    let mut pairing =
                        MemberPairing::neu(bootstrap, konfig.pairing, eigene_id);
                    pairing.starten(None, jetzt);
                    member_pairing = Some(pairing);
                }
            }
        }

        // Kooperative Poll-Schleife
        let mut takt =
            tokio::time::interval(std::time::Duration::from_millis(konfig.station.poll_intervall_ms));
        let mut naechster_status = jetzt + konfig.station.status_intervall_s * 1_000;
        let mut angeboten_fuer_epoch = kommandant.epoch();

        loop {
            tokio::select! {
                _ = takt.tick() => {}
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Ctrl-C, Station faehrt herunter");
                    break;
                }
            }
            let jetzt = jetzt_ms();

            // Team-Kanal: Eingang, Rotation, Wiederholungen
            let mut senke = SammelSenke::neu();
            kommandant.poll(&mut senke, jetzt);
            for (ctx, ereignis) in senke.ereignisse {
                ereignis_behandeln(&mut kommandant, &konfig, &ctx, &ereignis, jetzt);
            }

            // Pairing
            if let Some(pairing) = &mut leader_pairing {
                pairing.update(jetzt);
                // Nach einer Rotation beaconen wir das neue Material
                if kommandant.epoch() != angeboten_fuer_epoch {
                    if let (Some(team_id), LeaderZustand::Beaconing { .. }) =
                        (kommandant.team_id(), pairing.zustand())
                    {
                        pairing.starten(pairing_angebot(&kommandant, team_id)?, jetzt);
                    }
                    angeboten_fuer_epoch = kommandant.epoch();
                }
            }
            if let Some(pairing) = &mut member_pairing {
                pairing.update(jetzt);
                if let Some(etabliert) = pairing.abschluss() {
                    tracing::info!(
                        team = %etabliert.team_id,
                        name = %etabliert.team_name,
                        epoch = etabliert.epoch,
                        "Pairing abgeschlossen, Team-Kanal aktiv"
                    );
                    kommandant.schluessel_uebernehmen(
                        etabliert.team_id,
                        etabliert.epoch,
                        &etabliert.psk,
                        etabliert.leader_id,
                    )?;
                }
                if pairing.zustand() == MemberZustand::Failed {
                    tracing::warn!("Pairing fehlgeschlagen, kein Team beigetreten");
                    pairing.stop();
                }
            }

            // Periodischer Status-Heartbeat
            if kommandant.epoch().is_some() && jetzt >= naechster_status {
                naechster_status = jetzt + konfig.station.status_intervall_s * 1_000;
                let params = kommandant.ist_leader().then(|| StatusParams {
                    sende_intervall_s: konfig.station.status_intervall_s as u16,
                    flags: 0,
                });
                if let Err(fehler) = kommandant.status_senden(params, kommandant.ist_leader()) {
                    tracing::debug!(%fehler, "Status nicht gesendet");
                }
            }
        }

        if let Some(pairing) = &mut leader_pairing {
            pairing.stop();
        }
        if let Some(pairing) = &mut member_pairing {
            pairing.stop();
        }
        Ok(())
    }
}

/// Reagiert auf ein Team-Ereignis und protokolliert es
fn ereignis_behandeln(
    kommandant: &mut TeamCommander<Aes256GcmProvider, UdpMeshFunk>,
    konfig: &StationKonfig,
    ctx: &EventContext,
    ereignis: &TeamEvent,
    jetzt_ms: u64,
) {
    match ereignis {
        TeamEvent::JoinRequest(anfrage) => {
            // Anfragen von Geraeten ohne Schluessel laufen ueber das
            // Pairing; hier wird nur protokolliert
            tracing::info!(von = %anfrage.member_id, team = %anfrage.team_id, "Beitritts-Anfrage");
        }
        TeamEvent::JoinConfirm(bestaetigung) => {
            tracing::info!(mitglied = %bestaetigung.member_id, "Beitritt bestaetigt");
            // Frisch gepairtes Geraet: Aufnahme rotiert die Epoch und
            // verteilt das neue Material (auch an den Beitretenden, der
            // noch auf dem Pairing-Material sitzt)
            if kommandant.ist_leader()
                && konfig.station.auto_annehmen
                && !kommandant.mitglieder().contains(&bestaetigung.member_id)
            {
                if let Err(fehler) =
                    kommandant.beitritt_annehmen(bestaetigung.member_id, 0, jetzt_ms)
                {
                    tracing::warn!(%fehler, "Beitritt nicht angenommen");
                }
            }
        }
        TeamEvent::Advertise(ankuendigung) => {
            tracing::info!(team = %ankuendigung.team_id, name = %ankuendigung.name, "Team-Ankuendigung");
        }
        TeamEvent::Chat { daten } => {
            tracing::info!(von = %ctx.from, text = %String::from_utf8_lossy(daten), "Chat");
        }
        TeamEvent::Position { daten } => {
            tracing::debug!(von = %ctx.from, bytes = daten.len(), "Position");
        }
        TeamEvent::Waypoint { daten } => {
            tracing::info!(von = %ctx.from, bytes = daten.len(), "Wegpunkt");
        }
        TeamEvent::Track { daten } => {
            tracing::debug!(von = %ctx.from, bytes = daten.len(), "Track");
        }
        TeamEvent::Status(status) => {
            tracing::debug!(von = %ctx.from, epoch = status.epoch, "Status");
        }
        TeamEvent::KeyDist { epoch } => {
            tracing::info!(epoch, "Neues Schluesselmaterial uebernommen");
        }
        TeamEvent::JoinAccept { epoch, .. } => {
            tracing::info!(epoch, "Beitritts-Annahme verarbeitet");
        }
        TeamEvent::JoinDecision(entscheidung) => {
            tracing::info!(
                mitglied = %entscheidung.member_id,
                angenommen = entscheidung.angenommen,
                "Beitritts-Entscheidung"
            );
        }
        TeamEvent::Kick(kick) => {
            tracing::warn!(ziel = %kick.target, "Mitglied ausgeschlossen");
        }
        TeamEvent::TransferLeader(uebergabe) => {
            tracing::info!(neuer_leader = %uebergabe.target, "Leader-Uebergabe");
        }
        TeamEvent::KeyDistAufgegeben { mitglied, epoch } => {
            tracing::warn!(mitglied = %mitglied, epoch, "Schluessel-Zustellung aufgegeben");
        }
        TeamEvent::ZugriffWiderrufen => {
            tracing::warn!("Zugriff auf das Team wurde widerrufen");
        }
        TeamEvent::Fehler { fehler, kanal } => {
            tracing::debug!(?fehler, %kanal, von = %ctx.from, epoch = ctx.epoch, "Empfangs-Fehler");
        }
    }
}

fn pairing_angebot(
    kommandant: &TeamCommander<Aes256GcmProvider, UdpMeshFunk>,
    team_id: TeamId,
) -> Result<PairingAngebot, TeamfunkError> {
    Ok(PairingAngebot {
        team_id,
        epoch: kommandant.epoch().ok_or(TeamfunkError::KeinTeam)?,
        psk: kommandant.aktueller_psk().ok_or(TeamfunkError::KeinTeam)?,
        leader_id: kommandant.eigene_id(),
        name: kommandant.team_name().to_string(),
    })
}

fn vorverteilter_psk(konfig: &StationKonfig) -> Result<Option<Psk>, TeamfunkError> {
    let Some(psk_base64) = &konfig.team.psk_base64 else {
        return Ok(None);
    };
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(psk_base64)
        .map_err(|fehler| {
            TeamfunkError::Konfiguration(format!("psk_base64 ist kein gueltiges Base64: {}", fehler))
        })?;
    let psk = Psk::aus_slice(&bytes).ok_or_else(|| {
        TeamfunkError::Konfiguration(format!("PSK hat {} Bytes (Maximum 16)", bytes.len()))
    })?;
    Ok(Some(psk))
}

fn vorverteilte_team_id(konfig: &StationKonfig) -> Result<TeamId, TeamfunkError> {
    let hex = konfig.team.team_id_hex.as_deref().ok_or_else(|| {
        TeamfunkError::Konfiguration("team_id_hex fehlt (noetig mit psk_base64)".into())
    })?;
    if hex.len() != 16 {
        return Err(TeamfunkError::Konfiguration(
            "team_id_hex muss 16 Hex-Zeichen haben".into(),
        ));
    }
    let mut bytes = [0u8; 8];
    for (i, byte) in bytes.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).map_err(|_| {
            TeamfunkError::Konfiguration("team_id_hex enthaelt ungueltige Zeichen".into())
        })?;
    }
    Ok(TeamId::from_bytes(bytes))
}

/// Aktuelle Wanduhr-Zeit in Unix-Millisekunden
fn jetzt_ms() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TeamEinstellungen;

    #[test]
    fn vorverteilter_psk_dekodiert_base64() {
        let konfig = StationKonfig {
            team: TeamEinstellungen {
                psk_base64: Some("AAECAwQFBgcICQoLDA0ODw==".into()),
                ..TeamEinstellungen::default()
            },
            ..StationKonfig::default()
        };
        let psk = vorverteilter_psk(&konfig).unwrap().unwrap();
        assert_eq!(psk.as_slice(), &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15]);
    }

    #[test]
    fn ungueltiges_base64_wird_abgelehnt() {
        let konfig = StationKonfig {
            team: TeamEinstellungen {
                psk_base64: Some("kein base64!".into()),
                ..TeamEinstellungen::default()
            },
            ..StationKonfig::default()
        };
        assert!(vorverteilter_psk(&konfig).is_err());
    }

    #[test]
    fn team_id_hex_wird_geparst() {
        let konfig = StationKonfig {
            team: TeamEinstellungen {
                team_id_hex: Some("0011223344556677".into()),
                ..TeamEinstellungen::default()
            },
            ..StationKonfig::default()
        };
        let team_id = vorverteilte_team_id(&konfig).unwrap();
        assert_eq!(
            team_id,
            TeamId([0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77])
        );
    }

    #[test]
    fn zu_kurzes_team_id_hex_wird_abgelehnt() {
        let konfig = StationKonfig {
            team: TeamEinstellungen {
                team_id_hex: Some("0011".into()),
                ..TeamEinstellungen::default()
            },
            ..StationKonfig::default()
        };
        assert!(vorverteilte_team_id(&konfig).is_err());
    }
}
