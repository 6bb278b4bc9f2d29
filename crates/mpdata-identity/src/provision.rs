//! Identity provisioning: CA + leaf, issued once, reused forever.

use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose,
    IsCa, KeyUsagePurpose, SerialNumber,
};
use time::{Duration, OffsetDateTime};
use tracing::{debug, info};

use crate::key::PrivateKey;
use crate::storage::{Artifact, IdentityStore};
use crate::{
    IdentityError, KeyAlgorithm, Result, ValidityPeriod, DEFAULT_HOSTNAME, DEFAULT_ORGANIZATION,
};

/// What to issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityProfile {
    /// Subject organization of both certificates
    pub organization: String,
    /// Leaf common name
    pub hostname: String,
    /// Serial number of both certificates
    pub serial: u64,
    /// Validity window of both certificates
    pub validity: ValidityPeriod,
    /// Algorithm of both keys
    pub algorithm: KeyAlgorithm,
}

impl Default for IdentityProfile {
    fn default() -> Self {
        Self {
            organization: DEFAULT_ORGANIZATION.to_string(),
            hostname: DEFAULT_HOSTNAME.to_string(),
            serial: 1,
            validity: ValidityPeriod::default(),
            algorithm: KeyAlgorithm::default(),
        }
    }
}

/// PEM text of the four artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityBundle {
    pub ca_cert_pem: String,
    pub ca_key_pem: String,
    pub leaf_cert_pem: String,
    pub leaf_key_pem: String,
}

impl IdentityBundle {
    /// PEM text of one artifact.
    pub fn get(&self, artifact: Artifact) -> &str {
        match artifact {
            Artifact::CaCert => &self.ca_cert_pem,
            Artifact::CaKey => &self.ca_key_pem,
            Artifact::LeafCert => &self.leaf_cert_pem,
            Artifact::LeafKey => &self.leaf_key_pem,
        }
    }

    /// Read all four artifacts from a store.
    pub fn load<S: IdentityStore + ?Sized>(store: &S) -> Result<Self> {
        let read = |artifact: Artifact| -> Result<String> {
            String::from_utf8(store.read(artifact)?).map_err(|e| {
                IdentityError::PemDecode(format!("{}: {e}", artifact.file_name()))
            })
        };

        Ok(Self {
            ca_cert_pem: read(Artifact::CaCert)?,
            ca_key_pem: read(Artifact::CaKey)?,
            leaf_cert_pem: read(Artifact::LeafCert)?,
            leaf_key_pem: read(Artifact::LeafKey)?,
        })
    }

    fn commit<S: IdentityStore + ?Sized>(&self, store: &S) -> Result<()> {
        for artifact in Artifact::COMMIT_ORDER {
            store.write(artifact, self.get(artifact).as_bytes())?;
            info!(artifact = artifact.file_name(), "wrote identity artifact");
        }
        Ok(())
    }
}

/// Outcome of [`ensure_identity`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provisioned {
    /// `cert.pem` already existed; nothing was generated or written.
    Reused,
    /// A fresh CA and leaf were issued and persisted.
    Generated(IdentityBundle),
}

/// Make sure a TLS identity exists in `store`.
///
/// If the leaf certificate is present this returns immediately without
/// looking at its contents. Otherwise both key pairs and certificates are
/// generated in memory first and only then written, leaf certificate last,
/// so an interrupted run never leaves a `cert.pem` behind and the next run
/// starts over with a new CA.
pub fn ensure_identity<S: IdentityStore + ?Sized>(
    store: &S,
    profile: &IdentityProfile,
) -> Result<Provisioned> {
    if store.exists(Artifact::LeafCert)? {
        info!("leaf certificate present, reusing identity");
        return Ok(Provisioned::Reused);
    }

    info!(
        hostname = %profile.hostname,
        algorithm = ?profile.algorithm,
        validity = ?profile.validity,
        "no leaf certificate, issuing new identity"
    );

    let bundle = issue(profile)?;
    bundle.commit(store)?;

    Ok(Provisioned::Generated(bundle))
}

fn issue(profile: &IdentityProfile) -> Result<IdentityBundle> {
    let not_before = OffsetDateTime::now_utc();
    let not_after = validity_end(not_before, profile.validity)?;

    debug!("generating CA key");
    let ca_key = PrivateKey::generate(profile.algorithm)?;
    let ca_key_pem = ca_key.to_pem()?;
    let ca_key_pair = ca_key.to_key_pair()?;

    let mut ca_params = base_params(profile, not_before, not_after);
    ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    ca_params.key_usages = vec![
        KeyUsagePurpose::KeyEncipherment,
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyCertSign,
    ];
    let ca_cert = ca_params.self_signed(&ca_key_pair)?;
    debug!("self-signed CA certificate");

    debug!("generating leaf key");
    let leaf_key = PrivateKey::generate(profile.algorithm)?;
    let leaf_key_pem = leaf_key.to_pem()?;
    let leaf_key_pair = leaf_key.to_key_pair()?;

    let mut leaf_params = base_params(profile, not_before, not_after);
    leaf_params.subject_alt_names =
        CertificateParams::new(vec![profile.hostname.clone()])?.subject_alt_names;
    leaf_params
        .distinguished_name
        .push(DnType::CommonName, profile.hostname.as_str());
    leaf_params.is_ca = IsCa::ExplicitNoCa;
    leaf_params.key_usages = vec![
        KeyUsagePurpose::KeyEncipherment,
        KeyUsagePurpose::DigitalSignature,
    ];
    leaf_params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
    leaf_params.use_authority_key_identifier_extension = true;

    let leaf_cert = leaf_params.signed_by(&leaf_key_pair, &ca_cert, &ca_key_pair)?;
    debug!(hostname = %profile.hostname, "signed leaf certificate");

    Ok(IdentityBundle {
        ca_cert_pem: ca_cert.pem(),
        ca_key_pem,
        leaf_cert_pem: leaf_cert.pem(),
        leaf_key_pem,
    })
}

fn validity_end(not_before: OffsetDateTime, validity: ValidityPeriod) -> Result<OffsetDateTime> {
    validity
        .days()
        .and_then(|days| not_before.checked_add(Duration::days(i64::from(days))))
        .ok_or_else(|| IdentityError::InvalidValidity(format!("{validity:?} is out of range")))
}

/// Fields shared by the CA and the leaf.
fn base_params(
    profile: &IdentityProfile,
    not_before: OffsetDateTime,
    not_after: OffsetDateTime,
) -> CertificateParams {
    let mut params = CertificateParams::default();

    let mut dn = DistinguishedName::new();
    dn.push(DnType::OrganizationName, profile.organization.as_str());
    params.distinguished_name = dn;

    params.serial_number = Some(SerialNumber::from(profile.serial));
    params.not_before = not_before;
    params.not_after = not_after;
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{DirStore, MemoryStore};
    use crate::{inspect_certificate, verify_chain, CertificateType};
    use chrono::Utc;
    use tempfile::TempDir;

    fn test_profile() -> IdentityProfile {
        IdentityProfile {
            algorithm: KeyAlgorithm::Rsa2048,
            ..IdentityProfile::default()
        }
    }

    fn generated(outcome: Provisioned) -> IdentityBundle {
        match outcome {
            Provisioned::Generated(bundle) => bundle,
            Provisioned::Reused => panic!("expected a fresh identity"),
        }
    }

    #[test]
    fn test_default_profile() {
        let profile = IdentityProfile::default();
        assert_eq!(profile.organization, "5th Echelon");
        assert_eq!(profile.hostname, "sc6_pc_lnch_b.s3.amazonaws.com");
        assert_eq!(profile.serial, 1);
        assert_eq!(profile.validity.days(), Some(3560));
        assert_eq!(profile.algorithm, KeyAlgorithm::Rsa4096);
    }

    #[test]
    fn test_fresh_identity_chains_to_ca() {
        let store = MemoryStore::new();
        let bundle = generated(ensure_identity(&store, &test_profile()).unwrap());

        assert_eq!(store.write_count(), 4);
        for artifact in Artifact::COMMIT_ORDER {
            assert_eq!(
                store.get(artifact).unwrap(),
                bundle.get(artifact).as_bytes()
            );
        }
        verify_chain(&bundle.leaf_cert_pem, &bundle.ca_cert_pem).unwrap();
    }

    #[test]
    fn test_second_run_reuses() {
        let store = MemoryStore::new();
        let first = generated(ensure_identity(&store, &test_profile()).unwrap());

        let second = ensure_identity(&store, &test_profile()).unwrap();
        assert_eq!(second, Provisioned::Reused);
        assert_eq!(store.write_count(), 4);
        assert_eq!(IdentityBundle::load(&store).unwrap(), first);
    }

    #[test]
    fn test_leaf_presence_is_the_only_check() {
        let store = MemoryStore::new();
        store.write(Artifact::LeafCert, b"not a certificate").unwrap();

        let outcome = ensure_identity(&store, &test_profile()).unwrap();
        assert_eq!(outcome, Provisioned::Reused);
        assert!(store.get(Artifact::CaCert).is_none());
    }

    #[test]
    fn test_orphaned_ca_is_replaced() {
        let store = MemoryStore::new();
        store.write(Artifact::CaCert, b"orphan").unwrap();
        store.write(Artifact::CaKey, b"orphan").unwrap();

        let bundle = generated(ensure_identity(&store, &test_profile()).unwrap());
        assert_ne!(store.get(Artifact::CaCert).unwrap(), b"orphan");
        verify_chain(&bundle.leaf_cert_pem, &bundle.ca_cert_pem).unwrap();
    }

    #[test]
    fn test_certificate_attributes() {
        let store = MemoryStore::new();
        let bundle = generated(ensure_identity(&store, &test_profile()).unwrap());

        let ca = inspect_certificate(&bundle.ca_cert_pem).unwrap();
        assert_eq!(ca.cert_type, CertificateType::Authority);
        assert!(ca.key_cert_sign);
        assert!(ca.digital_signature);
        assert!(ca.key_encipherment);
        assert_eq!(ca.organization.as_deref(), Some("5th Echelon"));
        assert_eq!(ca.common_name, None);
        assert_eq!(ca.subject, ca.issuer);
        assert_eq!(ca.serial, "1");

        let leaf = inspect_certificate(&bundle.leaf_cert_pem).unwrap();
        assert_eq!(leaf.cert_type, CertificateType::Leaf);
        assert_eq!(
            leaf.common_name.as_deref(),
            Some("sc6_pc_lnch_b.s3.amazonaws.com")
        );
        assert_eq!(leaf.organization.as_deref(), Some("5th Echelon"));
        assert!(leaf.server_auth);
        assert!(!leaf.key_cert_sign);
        assert!(leaf.digital_signature);
        assert!(leaf.key_encipherment);
        assert_eq!(leaf.issuer, ca.subject);
        assert_eq!(leaf.serial, "1");
    }

    #[test]
    fn test_validity_window() {
        let store = MemoryStore::new();
        let bundle = generated(ensure_identity(&store, &test_profile()).unwrap());
        let now = Utc::now();

        for pem in [&bundle.ca_cert_pem, &bundle.leaf_cert_pem] {
            let info = inspect_certificate(pem).unwrap();
            assert!(info.is_valid_at(now));
            // Second-granularity encoding can shave a moment off the window.
            assert!((3559..=3560).contains(&info.validity_days()));
        }
    }

    #[test]
    fn test_key_pems() {
        let store = MemoryStore::new();
        let bundle = generated(ensure_identity(&store, &test_profile()).unwrap());

        for pem_text in [&bundle.ca_key_pem, &bundle.leaf_key_pem] {
            assert_eq!(pem::parse(pem_text).unwrap().tag(), "RSA PRIVATE KEY");
        }
        assert_ne!(bundle.ca_key_pem, bundle.leaf_key_pem);
    }

    #[test]
    fn test_unsupported_key_writes_nothing() {
        let store = MemoryStore::new();
        let profile = IdentityProfile {
            algorithm: KeyAlgorithm::EcdsaP256,
            ..IdentityProfile::default()
        };

        let err = ensure_identity(&store, &profile).unwrap_err();
        assert!(matches!(err, IdentityError::UnsupportedKey(_)));
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn test_out_of_range_validity_writes_nothing() {
        for validity in [ValidityPeriod::Years(100_000), ValidityPeriod::Years(u32::MAX)] {
            let store = MemoryStore::new();
            let profile = IdentityProfile {
                validity,
                ..test_profile()
            };

            let err = ensure_identity(&store, &profile).unwrap_err();
            assert!(matches!(err, IdentityError::InvalidValidity(_)), "{validity:?}");
            assert_eq!(store.write_count(), 0);
        }
    }

    /// Accepts every write except the leaf certificate.
    #[derive(Default)]
    struct LeafWriteFails {
        inner: MemoryStore,
    }

    impl IdentityStore for LeafWriteFails {
        fn exists(&self, artifact: Artifact) -> Result<bool> {
            self.inner.exists(artifact)
        }

        fn read(&self, artifact: Artifact) -> Result<Vec<u8>> {
            self.inner.read(artifact)
        }

        fn write(&self, artifact: Artifact, contents: &[u8]) -> Result<()> {
            if artifact == Artifact::LeafCert {
                return Err(IdentityError::storage(
                    artifact.file_name(),
                    std::io::Error::other("disk full"),
                ));
            }
            self.inner.write(artifact, contents)
        }
    }

    #[test]
    fn test_failed_commit_leaves_no_leaf_certificate() {
        let failing = LeafWriteFails::default();

        let err = ensure_identity(&failing, &test_profile()).unwrap_err();
        assert!(matches!(err, IdentityError::Storage { .. }));
        assert!(!failing.exists(Artifact::LeafCert).unwrap());
        assert_eq!(failing.inner.write_count(), 3);

        // The leftovers do not count as an identity: the next run starts over.
        let store = MemoryStore::new();
        for artifact in [Artifact::CaCert, Artifact::CaKey, Artifact::LeafKey] {
            store
                .write(artifact, &failing.inner.get(artifact).unwrap())
                .unwrap();
        }
        let bundle = generated(ensure_identity(&store, &test_profile()).unwrap());
        assert_ne!(
            store.get(Artifact::CaKey).unwrap(),
            failing.inner.get(Artifact::CaKey).unwrap()
        );
        verify_chain(&bundle.leaf_cert_pem, &bundle.ca_cert_pem).unwrap();
    }

    #[test]
    fn test_dir_store_scenario() {
        let dir = TempDir::new().unwrap();
        let store = DirStore::new(dir.path());

        generated(ensure_identity(&store, &test_profile()).unwrap());

        let mut mtimes = Vec::new();
        for name in ["ca.pem", "ca.key", "cert.pem", "key.pem"] {
            let path = dir.path().join(name);
            let content = std::fs::read_to_string(&path).unwrap();
            assert!(!content.is_empty(), "{name} is empty");
            pem::parse(&content).unwrap();
            mtimes.push(std::fs::metadata(&path).unwrap().modified().unwrap());
        }

        let bundle = IdentityBundle::load(&store).unwrap();
        verify_chain(&bundle.leaf_cert_pem, &bundle.ca_cert_pem).unwrap();

        std::thread::sleep(std::time::Duration::from_millis(20));
        assert_eq!(
            ensure_identity(&store, &test_profile()).unwrap(),
            Provisioned::Reused
        );

        for (name, before) in ["ca.pem", "ca.key", "cert.pem", "key.pem"]
            .iter()
            .zip(mtimes)
        {
            let after = std::fs::metadata(dir.path().join(name))
                .unwrap()
                .modified()
                .unwrap();
            assert_eq!(before, after, "{name} was rewritten");
        }
    }

    #[test]
    #[ignore = "4096-bit RSA generation is slow"]
    fn test_default_profile_issues_rsa4096() {
        let store = MemoryStore::new();
        let bundle = generated(ensure_identity(&store, &IdentityProfile::default()).unwrap());
        verify_chain(&bundle.leaf_cert_pem, &bundle.ca_cert_pem).unwrap();
    }
}
