//! Campaign dispatcher: runs one campaign end-to-end.
//!
//! Submission persists a PENDING campaign synchronously and returns; the
//! per-recipient loop runs in a background task. Recipients are processed
//! strictly in list order and serialize on the single transport session,
//! whose per-send humanization delay is the deliberate backpressure
//! mechanism. Individual recipient failures are recorded and skipped; only
//! orchestration-level failures flip the campaign to FAILED.

pub mod personalize;
pub mod stats;

use std::collections::{hash_map::Entry, HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info};
use uuid::Uuid;

use crate::error::EngineError;
use crate::model::{
    Campaign, CampaignStatus, DeliveryOutcome, Invitation, InvitationStatus, Recipient,
    FLYER_MARKER,
};
use crate::render::{self, FontCatalog, Overlay, RawOverlayConfig};
use crate::repo::Repository;
use crate::storage::FlyerStorage;
use crate::transport::Session;

pub use personalize::personalize;
pub use stats::{aggregate, Stats};

/// Placeholder recipient name used by flyer previews.
const PREVIEW_NAME: &str = "Hello World";

/// Placeholder verification URL used by flyer previews.
const PREVIEW_QR_URL: &str = "https://example.com/verify/SAMPLE";

/// Most recent campaigns whose delivery outcomes stay queryable.
const MAX_TRACKED_CAMPAIGNS: usize = 256;

/// In-process per-campaign delivery outcomes, in recipient list order.
/// Retention is bounded: once more than [`MAX_TRACKED_CAMPAIGNS`] campaigns
/// have recorded outcomes, the oldest campaign's entries are dropped.
#[derive(Default)]
struct OutcomeLog {
    order: VecDeque<Uuid>,
    entries: HashMap<Uuid, Vec<DeliveryOutcome>>,
}

impl OutcomeLog {
    fn record(&mut self, campaign_id: Uuid, outcome: DeliveryOutcome) {
        let entry = match self.entries.entry(campaign_id) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                self.order.push_back(campaign_id);
                e.insert(Vec::new())
            }
        };
        entry.push(outcome);

        while self.order.len() > MAX_TRACKED_CAMPAIGNS {
            if let Some(evicted) = self.order.pop_front() {
                self.entries.remove(&evicted);
            }
        }
    }

    fn get(&self, campaign_id: Uuid) -> Vec<DeliveryOutcome> {
        self.entries.get(&campaign_id).cloned().unwrap_or_default()
    }
}

/// Orchestrates campaigns over the shared transport session.
pub struct Dispatcher {
    repo: Arc<dyn Repository>,
    session: Arc<Session>,
    storage: FlyerStorage,
    fonts: FontCatalog,
    app_url: String,
    outcomes: RwLock<OutcomeLog>,
    /// Serializes the invitation scan transition: the stamp is a
    /// read-modify-write on the repository
    verify_lock: Mutex<()>,
}

impl Dispatcher {
    pub fn new(
        repo: Arc<dyn Repository>,
        session: Arc<Session>,
        storage: FlyerStorage,
        fonts: FontCatalog,
        app_url: String,
    ) -> Self {
        Dispatcher {
            repo,
            session,
            storage,
            fonts,
            app_url: app_url.trim_end_matches('/').to_string(),
            outcomes: RwLock::new(OutcomeLog::default()),
            verify_lock: Mutex::new(()),
        }
    }

    /// Persist a PENDING plain-text campaign and process it in the
    /// background. Returns as soon as the record is durable.
    pub async fn submit_plain(
        self: &Arc<Self>,
        sender_name: String,
        recipients: Vec<Recipient>,
        content: String,
    ) -> Result<Uuid, EngineError> {
        let campaign = Campaign::new(sender_name, content, recipients);
        self.repo
            .create_campaign(&campaign)
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;

        info!(
            campaign_id = %campaign.id,
            recipients = campaign.recipients.len(),
            "campaign_created"
        );

        let dispatcher = Arc::clone(self);
        let id = campaign.id;
        tokio::spawn(async move {
            let result = dispatcher.deliver_plain(&campaign).await;
            dispatcher.finalize(campaign, result).await;
        });

        Ok(id)
    }

    /// Persist a PENDING flyer campaign (template stored on disk, one
    /// invitation per recipient created during processing) and process it
    /// in the background. Returns the campaign id and the storage path.
    pub async fn submit_flyer(
        self: &Arc<Self>,
        sender_name: String,
        template_bytes: Vec<u8>,
        template_name: String,
        raw_config: RawOverlayConfig,
        recipients: Vec<Recipient>,
    ) -> Result<(Uuid, String), EngineError> {
        // Normalize the loosely typed client config at this boundary
        let overlay = Overlay::from_raw(&raw_config);

        let dir_name = FlyerStorage::campaign_dir_name(&sender_name);
        // Directory and template writes are best-effort: the campaign
        // proceeds even when the archive copy cannot be stored
        let dir = match self.storage.create_campaign_dir(&dir_name).await {
            Ok(dir) => {
                if let Err(e) = self.storage.save_template(&dir, &template_bytes).await {
                    error!(error = %e, "flyer_template_save_failed");
                }
                Some(dir)
            }
            Err(e) => {
                error!(error = %e, "flyer_dir_create_failed");
                None
            }
        };

        let content = format!("{FLYER_MARKER} {template_name} (Saved in {dir_name})");
        let campaign = Campaign::new(sender_name, content, recipients);
        self.repo
            .create_campaign(&campaign)
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;

        info!(
            campaign_id = %campaign.id,
            recipients = campaign.recipients.len(),
            dir = %dir_name,
            "flyer_campaign_created"
        );

        let dispatcher = Arc::clone(self);
        let id = campaign.id;
        let storage_path = dir
            .as_deref()
            .map(|d| d.display().to_string())
            .unwrap_or_default();
        tokio::spawn(async move {
            let result = dispatcher
                .deliver_flyer(&campaign, &template_bytes, &overlay, dir.as_deref())
                .await;
            dispatcher.finalize(campaign, result).await;
        });

        Ok((id, storage_path))
    }

    /// Render one sample flyer with placeholder content. No persistence,
    /// no send.
    pub fn preview(
        &self,
        template_bytes: &[u8],
        raw_config: RawOverlayConfig,
    ) -> Result<Vec<u8>, EngineError> {
        let overlay = Overlay::from_raw(&raw_config);
        let background = render::decode_normalized(template_bytes)?;
        let qr = if overlay.qr.is_some() {
            Some(render::generate_qr(PREVIEW_QR_URL)?)
        } else {
            None
        };
        render::render(&background, &overlay, PREVIEW_NAME, qr.as_ref(), &self.fonts)
    }

    /// Look up an invitation and confirm its scan. The SENT -> SCANNED
    /// transition happens at most once; later calls return the unchanged
    /// record.
    pub async fn verify_invitation(&self, id: Uuid) -> Result<Invitation, EngineError> {
        let _guard = self.verify_lock.lock().await;
        let mut invitation = self
            .repo
            .get_invitation(id)
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?
            .ok_or(EngineError::NotFound("invitation"))?;

        if invitation.status == InvitationStatus::Sent {
            invitation.status = InvitationStatus::Scanned;
            invitation.scanned_at = Some(Utc::now());
            self.repo
                .save_invitation(&invitation)
                .await
                .map_err(|e| EngineError::Storage(e.to_string()))?;
            info!(invitation_id = %invitation.id, "invitation_scanned");
        }

        Ok(invitation)
    }

    /// Aggregate counters and per-day activity over all campaigns.
    pub async fn stats(&self) -> Result<Stats, EngineError> {
        let campaigns = self
            .repo
            .list_campaigns()
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;
        Ok(aggregate(&campaigns))
    }

    /// All campaigns, newest first.
    pub async fn history(&self) -> Result<Vec<Campaign>, EngineError> {
        let mut campaigns = self
            .repo
            .list_campaigns()
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;
        campaigns.reverse();
        Ok(campaigns)
    }

    /// Recorded delivery outcomes of a campaign, in recipient list order.
    pub async fn outcomes(&self, campaign_id: Uuid) -> Vec<DeliveryOutcome> {
        self.outcomes.read().await.get(campaign_id)
    }

    async fn deliver_plain(&self, campaign: &Campaign) -> anyhow::Result<()> {
        for recipient in &campaign.recipients {
            let text = personalize(&campaign.content, recipient.name.as_deref());
            let outcome = match self.session.send_text(&recipient.phone, &text).await {
                Ok(receipt) => {
                    info!(
                        campaign_id = %campaign.id,
                        phone = %recipient.phone,
                        message_id = %receipt.message_id,
                        "plain_send_ok"
                    );
                    DeliveryOutcome {
                        phone: recipient.phone.clone(),
                        ok: true,
                        error: None,
                    }
                }
                Err(e) => {
                    // Isolated: the loop moves on to the next recipient
                    error!(
                        campaign_id = %campaign.id,
                        phone = %recipient.phone,
                        error = %e,
                        "plain_send_failed"
                    );
                    DeliveryOutcome {
                        phone: recipient.phone.clone(),
                        ok: false,
                        error: Some(e.to_string()),
                    }
                }
            };
            self.record_outcome(campaign.id, outcome).await;
        }
        Ok(())
    }

    async fn deliver_flyer(
        &self,
        campaign: &Campaign,
        template_bytes: &[u8],
        overlay: &Overlay,
        dir: Option<&Path>,
    ) -> anyhow::Result<()> {
        // Decode and orientation-normalize once; failing here is fatal to
        // the whole campaign
        let background = render::decode_normalized(template_bytes)?;

        for recipient in &campaign.recipients {
            let name = recipient.name.clone().unwrap_or_default();

            let invitation =
                Invitation::new(name.clone(), recipient.phone.clone(), campaign.id);
            self.repo.create_invitation(&invitation).await?;

            let qr = if overlay.qr.is_some() {
                let url = format!("{}/verify/{}", self.app_url, invitation.id);
                Some(render::generate_qr(&url)?)
            } else {
                None
            };

            let image_bytes =
                render::render(&background, overlay, &name, qr.as_ref(), &self.fonts)?;

            if let Some(dir) = dir {
                if let Err(e) = self
                    .storage
                    .save_rendered(dir, &recipient.phone, &image_bytes)
                    .await
                {
                    error!(
                        campaign_id = %campaign.id,
                        phone = %recipient.phone,
                        error = %e,
                        "flyer_save_failed"
                    );
                }
            }

            let caption = format!("Bonjour {name}, voici votre invitation !");
            let outcome = match self
                .session
                .send_image(&recipient.phone, &image_bytes, &caption)
                .await
            {
                Ok(receipt) => {
                    info!(
                        campaign_id = %campaign.id,
                        phone = %recipient.phone,
                        invitation_id = %invitation.id,
                        message_id = %receipt.message_id,
                        "flyer_send_ok"
                    );
                    DeliveryOutcome {
                        phone: recipient.phone.clone(),
                        ok: true,
                        error: None,
                    }
                }
                Err(e) => {
                    error!(
                        campaign_id = %campaign.id,
                        phone = %recipient.phone,
                        error = %e,
                        "flyer_send_failed"
                    );
                    DeliveryOutcome {
                        phone: recipient.phone.clone(),
                        ok: false,
                        error: Some(e.to_string()),
                    }
                }
            };
            self.record_outcome(campaign.id, outcome).await;
        }
        Ok(())
    }

    /// Set the terminal campaign status: SENT when the loop completed (all
    /// recipients attempted, whatever their individual outcomes), FAILED
    /// when the orchestration itself errored.
    async fn finalize(&self, mut campaign: Campaign, result: anyhow::Result<()>) {
        campaign.status = match result {
            Ok(()) => CampaignStatus::Sent,
            Err(e) => {
                error!(campaign_id = %campaign.id, error = %e, "campaign_failed");
                CampaignStatus::Failed
            }
        };

        if let Err(e) = self.repo.save_campaign(&campaign).await {
            error!(campaign_id = %campaign.id, error = %e, "campaign_finalize_save_failed");
            return;
        }

        info!(
            campaign_id = %campaign.id,
            status = ?campaign.status,
            "campaign_finalized"
        );
    }

    async fn record_outcome(&self, campaign_id: Uuid, outcome: DeliveryOutcome) {
        self.outcomes.write().await.record(campaign_id, outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::render::flyer::encode_png;
    use crate::repo::MemoryRepository;
    use crate::transport::mock::{wait_for_state, MemoryCredentialStore, MockNetwork};
    use crate::transport::{ConnectionEvent, SessionState};
    use image::{Rgba, RgbaImage};
    use std::time::Duration;
    use tokio::time::sleep;

    struct Harness {
        dispatcher: Arc<Dispatcher>,
        repo: Arc<MemoryRepository>,
        net: Arc<MockNetwork>,
        _tmp: tempfile::TempDir,
    }

    async fn open_harness() -> Harness {
        let config = Config {
            compose_delay_ms: (0, 0),
            send_timeout_ms: 500,
            ..Config::default()
        };
        let net = MockNetwork::new();
        let store = Arc::new(MemoryCredentialStore::default());
        let session = Session::spawn(net.connector(), store, &config);

        net.wait_for_connects(1).await;
        net.emit(ConnectionEvent::Open).await;
        wait_for_state(&session, SessionState::Open).await;

        let tmp = tempfile::tempdir().unwrap();
        let repo = Arc::new(MemoryRepository::new());
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&repo) as Arc<dyn Repository>,
            session,
            FlyerStorage::new(tmp.path()),
            FontCatalog::new(None),
            "https://campaigns.example.org".to_string(),
        ));

        Harness { dispatcher, repo, net, _tmp: tmp }
    }

    async fn wait_for_final_status(
        repo: &MemoryRepository,
        id: Uuid,
        expected: CampaignStatus,
    ) -> Campaign {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let campaign = repo.get_campaign(id).await.unwrap().unwrap();
            if campaign.status != CampaignStatus::Pending {
                assert_eq!(campaign.status, expected);
                return campaign;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "campaign never finalized"
            );
            sleep(Duration::from_millis(10)).await;
        }
    }

    fn recipient(phone: &str, name: Option<&str>) -> Recipient {
        Recipient {
            phone: phone.to_string(),
            name: name.map(|n| n.to_string()),
        }
    }

    fn template_png() -> Vec<u8> {
        let image = RgbaImage::from_pixel(60, 40, Rgba([0, 0, 180, 255]));
        encode_png(&image).unwrap()
    }

    fn qr_enabled_config() -> RawOverlayConfig {
        serde_json::from_str(
            r##"{"x": 5, "y": 5, "fontSize": 20, "color": "#ffffff",
                "previewWidth": 60, "previewHeight": 40,
                "qrConfig": {"enabled": true, "x": 10, "y": 10, "size": 15}}"##,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_plain_campaign_isolates_recipient_failures() {
        let h = open_harness().await;
        // Recipient #2 is rejected by the network
        h.net.fail_address("237699000002@s.whatsapp.net");

        let id = h
            .dispatcher
            .submit_plain(
                "Alice".to_string(),
                vec![
                    recipient("699000001", Some("Ada")),
                    recipient("699000002", Some("Bob")),
                    recipient("699000003", None),
                ],
                "Hi ${nom}!".to_string(),
            )
            .await
            .unwrap();

        // One recipient failing must still end the campaign SENT
        wait_for_final_status(&h.repo, id, CampaignStatus::Sent).await;

        let outcomes = h.dispatcher.outcomes(id).await;
        assert_eq!(outcomes.len(), 3);
        assert_eq!(
            outcomes.iter().map(|o| o.ok).collect::<Vec<_>>(),
            vec![true, false, true]
        );
        assert_eq!(outcomes[0].phone, "699000001");
        assert_eq!(outcomes[1].phone, "699000002");

        // Personalization and ordering on the wire
        let texts: Vec<String> = h
            .net
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("text:"))
            .collect();
        assert_eq!(
            texts,
            vec![
                "text:237699000001@s.whatsapp.net:Hi Ada!",
                "text:237699000003@s.whatsapp.net:Hi !",
            ]
        );
    }

    #[tokio::test]
    async fn test_flyer_campaign_creates_invitations_and_files() {
        let h = open_harness().await;

        let (id, storage_path) = h
            .dispatcher
            .submit_flyer(
                "Alice".to_string(),
                template_png(),
                "party.png".to_string(),
                qr_enabled_config(),
                // No names: the overlay text pass is skipped, so the test
                // does not depend on host fonts
                vec![recipient("699000001", None), recipient("699000002", None)],
            )
            .await
            .unwrap();

        let campaign = wait_for_final_status(&h.repo, id, CampaignStatus::Sent).await;
        assert!(campaign.is_flyer());

        // One invitation per recipient, one rendered file per phone
        let dir = std::path::Path::new(&storage_path);
        assert!(dir.join("template_original.png").exists());
        assert!(dir.join("699000001.png").exists());
        assert!(dir.join("699000002.png").exists());

        let outcomes = h.dispatcher.outcomes(id).await;
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.ok));

        let images: Vec<String> = h
            .net
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("image:"))
            .collect();
        assert_eq!(images.len(), 2);
        assert!(images[0].contains("Bonjour , voici votre invitation !"));
    }

    #[tokio::test]
    async fn test_flyer_campaign_rejects_undecodable_template() {
        let h = open_harness().await;

        let (id, _) = h
            .dispatcher
            .submit_flyer(
                "Alice".to_string(),
                b"not an image".to_vec(),
                "broken.bin".to_string(),
                qr_enabled_config(),
                vec![recipient("699000001", None)],
            )
            .await
            .unwrap();

        // Template decode failure is an orchestration failure
        wait_for_final_status(&h.repo, id, CampaignStatus::Failed).await;
        assert!(h.dispatcher.outcomes(id).await.is_empty());
    }

    #[tokio::test]
    async fn test_flyer_send_failure_is_isolated() {
        let h = open_harness().await;
        h.net.fail_address("237699000001@s.whatsapp.net");

        let (id, _) = h
            .dispatcher
            .submit_flyer(
                "Alice".to_string(),
                template_png(),
                "party.png".to_string(),
                qr_enabled_config(),
                vec![recipient("699000001", None), recipient("699000002", None)],
            )
            .await
            .unwrap();

        wait_for_final_status(&h.repo, id, CampaignStatus::Sent).await;
        let outcomes = h.dispatcher.outcomes(id).await;
        assert_eq!(
            outcomes.iter().map(|o| o.ok).collect::<Vec<_>>(),
            vec![false, true]
        );
    }

    #[tokio::test]
    async fn test_verify_invitation_is_idempotent() {
        let h = open_harness().await;
        let invitation = Invitation::new(
            "Ada".to_string(),
            "699000001".to_string(),
            Uuid::new_v4(),
        );
        h.repo.create_invitation(&invitation).await.unwrap();

        let first = h.dispatcher.verify_invitation(invitation.id).await.unwrap();
        assert_eq!(first.status, InvitationStatus::Scanned);
        let stamped = first.scanned_at.unwrap();

        let second = h.dispatcher.verify_invitation(invitation.id).await.unwrap();
        assert_eq!(second.status, InvitationStatus::Scanned);
        assert_eq!(second.scanned_at.unwrap(), stamped);
    }

    #[tokio::test]
    async fn test_concurrent_verifications_stamp_once() {
        let h = open_harness().await;
        let invitation = Invitation::new(
            "Ada".to_string(),
            "699000001".to_string(),
            Uuid::new_v4(),
        );
        h.repo.create_invitation(&invitation).await.unwrap();

        let (first, second) = tokio::join!(
            h.dispatcher.verify_invitation(invitation.id),
            h.dispatcher.verify_invitation(invitation.id),
        );
        let first = first.unwrap();
        let second = second.unwrap();

        assert_eq!(first.status, InvitationStatus::Scanned);
        assert_eq!(second.status, InvitationStatus::Scanned);
        // Exactly one of the racing calls stamps; both observe that stamp
        assert_eq!(first.scanned_at.unwrap(), second.scanned_at.unwrap());
    }

    #[test]
    fn test_outcome_log_evicts_oldest_campaign() {
        let outcome = |phone: &str| DeliveryOutcome {
            phone: phone.to_string(),
            ok: true,
            error: None,
        };

        let mut log = OutcomeLog::default();
        let first = Uuid::new_v4();
        log.record(first, outcome("699000001"));
        for _ in 0..MAX_TRACKED_CAMPAIGNS {
            log.record(Uuid::new_v4(), outcome("699000002"));
        }

        assert!(log.get(first).is_empty());
        assert_eq!(log.entries.len(), MAX_TRACKED_CAMPAIGNS);
        assert_eq!(log.order.len(), MAX_TRACKED_CAMPAIGNS);
    }

    #[tokio::test]
    async fn test_verify_unknown_invitation_is_not_found() {
        let h = open_harness().await;
        let err = h
            .dispatcher
            .verify_invitation(Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_preview_renders_without_persisting() {
        let h = open_harness().await;
        let config: RawOverlayConfig = serde_json::from_str(
            r##"{"x": 5, "y": 5, "fontSize": 20, "color": "#ffffff",
                "previewWidth": 60, "previewHeight": 40,
                "qrConfig": {"enabled": true, "x": 10, "y": 10, "size": 15}}"##,
        )
        .unwrap();

        // Preview always draws the placeholder name; skip on fontless hosts
        if FontCatalog::new(None).load(crate::render::FontFamily::Sans).is_none() {
            return;
        }

        let bytes = h.dispatcher.preview(&template_png(), config).unwrap();
        let decoded = render::decode_normalized(&bytes).unwrap();
        assert_eq!(render::native_dimensions(&decoded), (60, 40));
        assert!(h.repo.list_campaigns().await.unwrap().is_empty());
    }
}
