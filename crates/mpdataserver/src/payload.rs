//! The multiplayer data blob served to the game client.

use bytes::Bytes;
use std::path::Path;

use crate::{Result, ServerError};

/// Tuning overrides fetched by the game over HTTPS.
///
/// Byte-for-byte significant: the client parses this text as-is.
pub const MP_DATA: &str = "[Echelon.EPlayerPawn]
SpyWeaponEffectDurationLookUpTable=3.0f;
SpyWeaponEffectDurationLookUpTable=2.0f;
SpyWeaponEffectDurationLookUpTable=1.0f;

[Echelon.GI_Adv_AntiGrenadeSystem]
m_AdversarialInventoryLimit=2

[MPArmorHelmetTech]
m_fBMSRefreshDelayMultiplier=0.8

[EXPLOSION_STICKYCAM_ADV]
GroundZeroRadius=280
GroundZeroZoneDamage=150
BlastZoneDamage=80
NPCGroundZeroRadius=280
NPCBlastRadius=600
NPCGroundZeroZoneDamage=150
NPCBlastZoneDamage=80

[EXPLOSION_PROXMINE_ADV]
GroundZeroZoneDamage=150

[EXPLOSION_GRENADE_ADV]
GroundZeroZoneDamage=150

[EXPLOSION_ADVDRONE]
GroundZeroZoneDamage=150
";

/// Response body shared by every connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload(Bytes);

impl Default for Payload {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Payload {
    /// The built-in [`MP_DATA`] text.
    pub const fn builtin() -> Self {
        Self(Bytes::from_static(MP_DATA.as_bytes()))
    }

    /// Read an override file once.
    pub fn from_file(path: &Path) -> Result<Self> {
        std::fs::read(path)
            .map(|data| Self(Bytes::from(data)))
            .map_err(|source| ServerError::Payload {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Override file if configured, built-in text otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        path.map_or_else(|| Ok(Self::builtin()), Self::from_file)
    }

    /// Body bytes (cheap clone).
    pub fn bytes(&self) -> Bytes {
        self.0.clone()
    }

    /// Body length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the body is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
