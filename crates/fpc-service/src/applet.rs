//! Client for the fingerprint trustlet.
//!
//! Every command goes through [`FpcClient::send`]: allocate a shared region
//! sized for the record, encode the record into it, hand it to the
//! trustlet, decode the answer in place and free the region. Regions are
//! never reused and are freed on every path, including failures.
//!
//! A command fails when the secure world call reports a non-zero response
//! word or when the record comes back with a negative status. Both are
//! logged with their trustlet error name and surface as
//! [`Error::Applet`] carrying the raw code.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use fpc_core::{
    Error, HwAuthToken, PrintId, Result,
    constants::{AUTH_TOKEN_LENGTH, MAX_FINGERPRINTS},
};
use fpc_hardware::{SecureEnvironment, SensorDevice, TrustletHandle};
use fpc_protocol::{
    AuthChallenge, AuthResult, BufferCommand, Command, DeleteFingerprint, EndEnroll, EnrollStep,
    FingerprintList, Header, Identify, KeymasterRequest, KeymasterResponse, Record, SetGid,
    StandardCommand, TemplateId, applet_error_name, decode_record, encode_record,
    keymaster::KEYMASTER_REQUEST_AREA,
};
use tracing::{debug, error, info, warn};

use crate::config::AppletConfig;
use crate::storage::staging_path;

/// Connection to the fingerprint trustlet.
///
/// The client is not internally synchronized; the service keeps it behind a
/// mutex that is locked once per command.
#[derive(Debug)]
pub struct FpcClient<E> {
    env: E,
    config: AppletConfig,
    trustlet: Option<TrustletHandle>,
    auth_id: Option<u64>,
}

impl<E: SecureEnvironment> FpcClient<E> {
    /// Create a closed client. Call [`FpcClient::init`] before sending.
    pub fn new(env: E, config: AppletConfig) -> Self {
        Self {
            env,
            config,
            trustlet: None,
            auth_id: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.trustlet.is_some()
    }

    pub fn config(&self) -> &AppletConfig {
        &self.config
    }

    /// Bring the trustlet up and provision its token key.
    ///
    /// Powers the sensor on, loads keymaster and the fingerprint trustlet,
    /// initializes the latter, moves the key blob from keymaster into it and
    /// powers the sensor off again. Keymaster is shut down as soon as the
    /// key has been read.
    ///
    /// # Errors
    ///
    /// Any failure is reported as the fatal `Error::InitializationFailed`.
    /// The client is left closed and the sensor powered off.
    pub fn init<S: SensorDevice>(&mut self, sensor: &mut S) -> Result<()> {
        let result = self.try_init(sensor);

        if let Err(e) = sensor.set_power(false) {
            warn!(error = %e, "could not power sensor off after initialization");
        }

        match result {
            Ok(()) => {
                info!(trustlet = %self.config.fingerprint_name, "fingerprint trustlet ready");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "fingerprint trustlet initialization failed");
                self.close();
                Err(Error::InitializationFailed(e.to_string()))
            }
        }
    }

    fn try_init<S: SensorDevice>(&mut self, sensor: &mut S) -> Result<()> {
        sensor.set_power(true)?;

        let keymaster = self.load_keymaster()?;
        let key = self
            .start_fingerprint()
            .and_then(|()| self.fetch_key(&keymaster));

        if let Err(e) = self.env.shutdown_trustlet(keymaster) {
            warn!(error = %e, "keymaster shutdown failed");
        }

        let key = key?;
        debug!(len = key.len(), "key blob received from keymaster");
        self.send(&mut BufferCommand::new(Command::SetKeyData, key))
    }

    fn load_keymaster(&mut self) -> Result<TrustletHandle> {
        let mut last_error = None;
        for name in &self.config.keymaster_names {
            match self.env.load_trustlet(
                &self.config.keymaster_path,
                name,
                self.config.keymaster_shared_len,
            ) {
                Ok(handle) => return Ok(handle),
                Err(e) => {
                    warn!(name = %name, error = %e, "keymaster not loadable under this name");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.map_or_else(
            || Error::Config("no keymaster trustlet names configured".into()),
            Error::from,
        ))
    }

    fn start_fingerprint(&mut self) -> Result<()> {
        let trustlet = self.env.load_trustlet(
            &self.config.fingerprint_path,
            &self.config.fingerprint_name,
            self.config.fingerprint_shared_len,
        )?;
        self.trustlet = Some(trustlet);
        self.send(&mut StandardCommand::new(Command::Init))
    }

    fn fetch_key(&mut self, keymaster: &TrustletHandle) -> Result<Vec<u8>> {
        let request = encode_record(&KeymasterRequest::key_request());
        let response_len = self
            .config
            .keymaster_shared_len
            .saturating_sub(KEYMASTER_REQUEST_AREA);
        let mut response = vec![0u8; response_len];

        self.env.send_command(keymaster, &request, &mut response)?;

        let header: KeymasterResponse = decode_record(&response)?;
        if header.status < 0 {
            return Err(Error::applet("KEYMASTER_GET_KEY", header.status));
        }
        Ok(header.key_blob(&response)?.to_vec())
    }

    /// Shut the fingerprint trustlet down. Safe to call when closed.
    pub fn close(&mut self) {
        self.auth_id = None;
        if let Some(trustlet) = self.trustlet.take() {
            match self.env.shutdown_trustlet(trustlet) {
                Ok(()) => debug!("fingerprint trustlet closed"),
                Err(e) => warn!(error = %e, "fingerprint trustlet shutdown failed"),
            }
        }
    }

    /// Close and initialize again.
    pub fn reinit<S: SensorDevice>(&mut self, sensor: &mut S) -> Result<()> {
        info!("re-initializing fingerprint trustlet");
        self.close();
        self.init(sensor)
    }

    /// Run one command through a fresh shared region.
    ///
    /// On success `record` holds the trustlet's answer.
    pub fn send<R: Record>(&mut self, record: &mut R) -> Result<()> {
        let Some(trustlet) = self.trustlet.as_ref() else {
            return Err(Error::HardwareError("fingerprint trustlet is not loaded".into()));
        };

        let mut region = self.env.alloc_shared(record.encoded_len())?;
        {
            let mut out: &mut [u8] = region.as_mut_slice();
            record.encode(&mut out);
        }
        let name = Header::peek(region.as_slice())
            .ok()
            .and_then(|header| header.command())
            .map_or(R::NAME, Command::name);

        let outcome = self
            .env
            .send_modified_command(trustlet, &mut region)
            .map_err(Error::from)
            .and_then(|response| {
                if response != 0 {
                    error!(
                        command = name,
                        response,
                        error = applet_error_name(response),
                        "trustlet rejected command"
                    );
                    return Err(Error::applet(name, response));
                }
                decode_record::<R>(region.as_slice())
            });

        if let Err(e) = self.env.free_shared(region) {
            warn!(command = name, error = %e, "could not free shared region");
        }

        *record = outcome?;
        let status = record.status();
        if status < 0 {
            warn!(
                command = name,
                status,
                error = applet_error_name(status),
                "command failed"
            );
            return Err(Error::applet(name, status));
        }
        debug!(command = name, status, "command completed");
        Ok(())
    }

    fn standard(&mut self, command: Command) -> Result<i32> {
        let mut cmd = StandardCommand::new(command);
        self.send(&mut cmd)?;
        Ok(cmd.ret_val)
    }

    /// `0` while a finger still rests on the sensor, positive once it left.
    pub fn wait_finger_lost(&mut self) -> Result<i32> {
        self.standard(Command::WaitFingerLost)
    }

    /// Arm the finger detector. `0` means the caller has to wait for the
    /// finger interrupt, positive means a finger is already down.
    pub fn arm_finger_down(&mut self) -> Result<i32> {
        self.standard(Command::WaitFingerDown)
    }

    /// Capture one image and return its acquisition status.
    pub fn capture_image(&mut self) -> Result<i32> {
        self.standard(Command::CaptureImage)
    }

    pub fn begin_enroll(&mut self) -> Result<()> {
        self.standard(Command::BeginEnrol).map(|_| ())
    }

    /// Feed the last capture to the running enrollment and return the
    /// number of touches still needed.
    pub fn enroll_step(&mut self) -> Result<u32> {
        let mut cmd = EnrollStep::new();
        self.send(&mut cmd)?;
        Ok(cmd.remaining_touches)
    }

    /// Finish the enrollment and return the new print id.
    pub fn end_enroll(&mut self) -> Result<PrintId> {
        let mut cmd = EndEnroll::new();
        self.send(&mut cmd)?;
        self.auth_id = None;
        Ok(PrintId(cmd.print_id))
    }

    /// Match the last capture. [`PrintId::NONE`] means no print matched.
    ///
    /// A retryable miss comes back as `Error::Applet` with `-EAGAIN`.
    pub fn identify(&mut self) -> Result<PrintId> {
        let mut cmd = Identify::new();
        self.send(&mut cmd)?;
        debug!(id = cmd.id, dbg1 = cmd.dbg1, dbg2 = cmd.dbg2, "identify");
        Ok(PrintId(cmd.id))
    }

    /// Let the trustlet refine the matched template. Returns whether the
    /// database changed and should be stored.
    pub fn update_template(&mut self) -> Result<bool> {
        self.standard(Command::UpdateTemplate).map(|ret| ret > 0)
    }

    /// Print ids of the active group, in trustlet order.
    pub fn fingerprint_ids(&mut self) -> Result<Vec<PrintId>> {
        let mut list = FingerprintList::new();
        self.send(&mut list)?;

        if list.length as usize > MAX_FINGERPRINTS {
            error!(length = list.length, "trustlet reported too many prints");
            return Err(Error::InvalidRecord(format!(
                "print listing of {} exceeds {MAX_FINGERPRINTS}",
                list.length
            )));
        }
        Ok(list.prints().iter().copied().map(PrintId).collect())
    }

    pub fn delete_fingerprint(&mut self, print: PrintId) -> Result<()> {
        let mut cmd = DeleteFingerprint::new(print.0);
        self.send(&mut cmd)?;
        self.auth_id = None;
        Ok(())
    }

    pub fn load_empty_database(&mut self) -> Result<()> {
        self.auth_id = None;
        self.standard(Command::LoadEmptyDb).map(|_| ())
    }

    pub fn load_database(&mut self, path: &Path) -> Result<()> {
        self.auth_id = None;
        let mut cmd = BufferCommand::new(Command::LoadDb, path_bytes(path));
        self.send(&mut cmd)
    }

    /// Persist the template database to `path`.
    ///
    /// The trustlet writes `<path>.tmp`, which is then renamed over `path`.
    /// On failure the staging file is removed and `path` is left untouched.
    pub fn store_database(&mut self, path: &Path) -> Result<()> {
        let staging = staging_path(path);
        let mut cmd = BufferCommand::new(Command::StoreDb, path_bytes(&staging));

        let result = self
            .send(&mut cmd)
            .and_then(|()| fs::rename(&staging, path).map_err(Error::from));

        if let Err(e) = &result {
            error!(path = %path.display(), error = %e, "storing template database failed");
            match fs::remove_file(&staging) {
                Ok(()) => debug!(path = %staging.display(), "staging file removed"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!(path = %staging.display(), error = %e, "staging file left behind"),
            }
        } else {
            debug!(path = %path.display(), "template database stored");
        }
        result
    }

    pub fn set_gid(&mut self, gid: u32) -> Result<()> {
        self.send(&mut SetGid::new(gid))
    }

    /// Challenge that authentication tokens will be bound to.
    pub fn set_auth_challenge(&mut self, challenge: u64) -> Result<()> {
        self.send(&mut AuthChallenge::new(Command::SetAuthChallenge, challenge))
    }

    /// Ask the trustlet for a fresh enroll challenge.
    pub fn load_auth_challenge(&mut self) -> Result<u64> {
        let mut cmd = AuthChallenge::new(Command::GetAuthChallenge, 0);
        self.send(&mut cmd)?;
        Ok(cmd.challenge)
    }

    /// Present the enroll authorization token.
    pub fn authorize_enroll(&mut self, token: &[u8]) -> Result<()> {
        if token.len() != AUTH_TOKEN_LENGTH {
            return Err(Error::InvalidRecord(format!(
                "authorization token must be {AUTH_TOKEN_LENGTH} bytes, got {}",
                token.len()
            )));
        }
        self.send(&mut BufferCommand::new(Command::AuthorizeEnrol, token))
    }

    /// Hardware authentication token for the last successful identify.
    pub fn hw_auth_token(&mut self) -> Result<HwAuthToken> {
        let mut cmd = AuthResult::new();
        self.send(&mut cmd)?;
        if cmd.length as usize != AUTH_TOKEN_LENGTH {
            return Err(Error::InvalidRecord(format!(
                "auth token length {} reported",
                cmd.length
            )));
        }
        HwAuthToken::from_bytes(&cmd.token)
    }

    /// Id of the loaded template database. Cached until the database
    /// changes.
    pub fn authenticator_id(&mut self) -> Result<u64> {
        if let Some(id) = self.auth_id {
            return Ok(id);
        }
        let mut cmd = TemplateId::new();
        self.send(&mut cmd)?;
        self.auth_id = Some(cmd.auth_id);
        Ok(cmd.auth_id)
    }

    /// Load the database at `db_path`, creating and storing an empty one if
    /// the file does not exist, and select `gid`.
    pub fn activate_group(&mut self, gid: u32, db_path: &Path) -> Result<()> {
        let created = if db_path.exists() {
            self.load_database(db_path)?;
            false
        } else {
            info!(path = %db_path.display(), "no template database, starting empty");
            self.load_empty_database()?;
            true
        };

        let gid_result = self.set_gid(gid);
        if let Err(e) = &gid_result {
            error!(gid, error = %e, "could not select group");
        }

        if created {
            if let Err(e) = self.store_database(db_path) {
                warn!(error = %e, "could not store new template database");
            }
            return self.load_database(db_path);
        }
        gid_result
    }
}

fn path_bytes(path: &Path) -> Vec<u8> {
    path.as_os_str().as_encoded_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fpc_hardware::mock::{
        EmulatorConfig, EmulatorHandle, MockSecureEnvironment, MockSensor, emulated_device,
    };

    fn open_client(config: EmulatorConfig) -> (FpcClient<MockSecureEnvironment>, MockSensor, EmulatorHandle) {
        let (env, mut sensor, handle) = emulated_device(config);
        let mut client = FpcClient::new(env, AppletConfig::default());
        client.init(&mut sensor).unwrap();
        (client, sensor, handle)
    }

    #[test]
    fn test_init_provisions_key_and_releases_keymaster() {
        let (client, _sensor, handle) = open_client(EmulatorConfig::default());
        assert!(client.is_open());
        assert!(handle.key_provisioned());
        assert_eq!(handle.loaded_trustlets(), vec!["tzfingerprint".to_string()]);
        assert!(!handle.is_powered());
        assert_eq!(handle.outstanding_regions(), 0);
    }

    #[test]
    fn test_init_falls_back_to_second_keymaster_name() {
        let config = EmulatorConfig {
            missing_trustlets: vec!["keymaste".into()],
            ..EmulatorConfig::default()
        };
        let (_client, _sensor, handle) = open_client(config);
        assert!(handle.key_provisioned());
    }

    #[test]
    fn test_init_failure_cleans_up() {
        let (env, mut sensor, handle) = emulated_device(EmulatorConfig::default());
        handle.set_trustlet_missing("tzfingerprint", true);
        let mut client = FpcClient::new(env, AppletConfig::default());

        let err = client.init(&mut sensor).unwrap_err();
        assert!(matches!(err, Error::InitializationFailed(_)));
        assert!(err.is_fatal());
        assert!(!client.is_open());
        assert!(handle.loaded_trustlets().is_empty());
        assert!(!handle.is_powered());
    }

    #[test]
    fn test_init_fails_when_sensor_does_not_power_on() {
        let (env, mut sensor, handle) = emulated_device(EmulatorConfig::default());
        handle.set_power_failure(true);
        let mut client = FpcClient::new(env, AppletConfig::default());
        assert!(matches!(
            client.init(&mut sensor),
            Err(Error::InitializationFailed(_))
        ));
        assert!(handle.loaded_trustlets().is_empty());
    }

    #[test]
    fn test_send_when_closed() {
        let (env, _sensor, _handle) = emulated_device(EmulatorConfig::default());
        let mut client = FpcClient::new(env, AppletConfig::default());
        assert!(matches!(
            client.set_gid(0),
            Err(Error::HardwareError(_))
        ));
    }

    #[test]
    fn test_regions_freed_on_transport_failure() {
        let (mut client, _sensor, handle) = open_client(EmulatorConfig::default());
        handle.set_transport_failure(true);
        assert!(matches!(client.set_gid(3), Err(Error::Transport(_))));
        assert_eq!(handle.outstanding_regions(), 0);
    }

    #[test]
    fn test_negative_status_is_an_applet_error() {
        let (mut client, _sensor, handle) = open_client(EmulatorConfig::default());
        // Nothing was captured, so the emulated trustlet asks for a retry.
        let err = client.identify().unwrap_err();
        assert!(matches!(err, Error::Applet { ref command, status: -11 } if command == "FPC_IDENTIFY"));
        assert_eq!(handle.outstanding_regions(), 0);
    }

    #[test]
    fn test_overlong_listing_is_rejected() {
        let (mut client, _sensor, handle) = open_client(EmulatorConfig::default());
        client.load_empty_database().unwrap();
        handle.report_listing_length(Some(6));
        let err = client.fingerprint_ids().unwrap_err();
        assert!(matches!(err, Error::InvalidRecord(_)));
        assert_eq!(err.errno(), -22);
    }

    #[test]
    fn test_authenticator_id_is_cached() {
        let (mut client, _sensor, handle) = open_client(EmulatorConfig::default());
        client.load_empty_database().unwrap();
        let first = client.authenticator_id().unwrap();
        let sent = handle.commands_sent();
        assert_eq!(client.authenticator_id().unwrap(), first);
        assert_eq!(handle.commands_sent(), sent);

        client.load_empty_database().unwrap();
        assert_ne!(client.authenticator_id().unwrap(), first);
    }

    #[test]
    fn test_activate_group_creates_database() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("user.db");
        let (mut client, _sensor, _handle) = open_client(EmulatorConfig::default());

        client.activate_group(4, &db_path).unwrap();
        assert!(db_path.exists());
        assert!(!staging_path(&db_path).exists());

        // A second activation loads the stored file.
        let id = client.authenticator_id().unwrap();
        client.activate_group(4, &db_path).unwrap();
        assert_eq!(client.authenticator_id().unwrap(), id);
    }

    #[test]
    fn test_failed_store_keeps_previous_database() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("user.db");
        let (mut client, _sensor, handle) = open_client(EmulatorConfig::default());
        client.activate_group(0, &db_path).unwrap();
        let before = fs::read(&db_path).unwrap();

        handle.fail_next_store();
        assert!(client.store_database(&db_path).is_err());
        assert_eq!(fs::read(&db_path).unwrap(), before);
        assert!(!staging_path(&db_path).exists());
    }

    #[test]
    fn test_authorize_rejects_short_token() {
        let (mut client, _sensor, _handle) = open_client(EmulatorConfig::default());
        assert!(matches!(
            client.authorize_enroll(&[0; 12]),
            Err(Error::InvalidRecord(_))
        ));
    }

    #[test]
    fn test_close_shuts_down_trustlet() {
        let (mut client, _sensor, handle) = open_client(EmulatorConfig::default());
        client.close();
        client.close();
        assert!(!client.is_open());
        assert!(handle.loaded_trustlets().is_empty());
    }
}
