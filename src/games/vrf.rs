//! VRF commitment engine.
//!
//! Every round commits its randomness before any balance moves: the engine
//! signs a message derived from the round context, hashes the signature into
//! a 32-byte output, and seeds the outcome RNG from that output. The bundle
//! (output, proof, public key, input message) is stored on the round so a
//! settled round can be re-verified and re-derived by anyone.

use crate::errors::{EngineError, EngineResult};
use rand::rngs::StdRng;
use rand::SeedableRng;
use schnorrkel::{Keypair, PublicKey, Signature};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

const VRF_SIGNING_CONTEXT: &[u8] = b"stakehouse-round";

/// Cryptographic commitment for one round's randomness.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VrfBundle {
    /// Hex-encoded VRF output (32 bytes).
    pub vrf_output: String,
    /// Hex-encoded VRF proof (64-byte schnorrkel signature).
    pub vrf_proof: String,
    /// Hex-encoded public key (32 bytes).
    pub public_key: String,
    /// Input message the proof commits to.
    pub input_message: String,
}

pub struct VrfEngine {
    keypair: Arc<Keypair>,
}

impl VrfEngine {
    pub fn new(keypair: Keypair) -> Self {
        Self {
            keypair: Arc::new(keypair),
        }
    }

    /// Create an engine with a fresh random keypair.
    pub fn new_random() -> Self {
        use rand_core::OsRng;
        Self::new(Keypair::generate_with(OsRng))
    }

    /// Restore an engine from the 96-byte keypair encoding, if present.
    pub fn from_bytes(bytes: &[u8]) -> EngineResult<Self> {
        let keypair = Keypair::from_bytes(bytes)
            .map_err(|e| EngineError::Vrf(format!("invalid keypair bytes: {:?}", e)))?;
        Ok(Self::new(keypair))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.keypair.to_bytes().to_vec()
    }

    /// Commit randomness for a round. The input message binds the round id,
    /// game, user and the serialized risk parameters, so none of them can be
    /// swapped after the fact.
    pub fn commit(
        &self,
        round_id: &str,
        game: &str,
        user_id: &str,
        params_fingerprint: &str,
    ) -> EngineResult<VrfBundle> {
        let input_message = format!("{}:{}:{}:{}", round_id, game, user_id, params_fingerprint);
        let (vrf_output, vrf_proof) = self.vrf_sign(input_message.as_bytes());

        Ok(VrfBundle {
            vrf_output: hex::encode(vrf_output),
            vrf_proof: hex::encode(vrf_proof),
            public_key: hex::encode(self.keypair.public.to_bytes()),
            input_message,
        })
    }

    fn vrf_sign(&self, message: &[u8]) -> (Vec<u8>, Vec<u8>) {
        use schnorrkel::context::SigningContext;

        let ctx = SigningContext::new(VRF_SIGNING_CONTEXT);
        let signature = self.keypair.sign(ctx.bytes(message));

        // The output is the hash of the signature; the proof is the
        // signature itself.
        let mut hasher = Sha256::new();
        hasher.update(signature.to_bytes());
        let vrf_output = hasher.finalize().to_vec();

        (vrf_output, signature.to_bytes().to_vec())
    }

    /// Seed a deterministic RNG from a committed bundle. All outcome
    /// sampling for the round flows from this.
    pub fn rng_for(bundle: &VrfBundle) -> EngineResult<StdRng> {
        let output = hex::decode(&bundle.vrf_output)
            .map_err(|e| EngineError::Vrf(format!("invalid VRF output hex: {}", e)))?;
        let seed: [u8; 32] = output
            .try_into()
            .map_err(|_| EngineError::Vrf("VRF output must be 32 bytes".to_string()))?;
        Ok(StdRng::from_seed(seed))
    }

    /// Verify a bundle against the input message it should commit to.
    pub fn verify(bundle: &VrfBundle, expected_input: &str) -> EngineResult<bool> {
        if bundle.input_message != expected_input {
            return Ok(false);
        }

        let vrf_output = hex::decode(&bundle.vrf_output)
            .map_err(|e| EngineError::Vrf(format!("invalid VRF output hex: {}", e)))?;
        let vrf_proof = hex::decode(&bundle.vrf_proof)
            .map_err(|e| EngineError::Vrf(format!("invalid VRF proof hex: {}", e)))?;
        let public_key_bytes = hex::decode(&bundle.public_key)
            .map_err(|e| EngineError::Vrf(format!("invalid public key hex: {}", e)))?;

        let public_key_array: [u8; 32] = public_key_bytes
            .try_into()
            .map_err(|_| EngineError::Vrf("public key must be 32 bytes".to_string()))?;
        let public_key = PublicKey::from_bytes(&public_key_array)
            .map_err(|e| EngineError::Vrf(format!("invalid public key: {:?}", e)))?;

        let signature_array: [u8; 64] = vrf_proof
            .try_into()
            .map_err(|_| EngineError::Vrf("signature must be 64 bytes".to_string()))?;
        let signature = Signature::from_bytes(&signature_array)
            .map_err(|e| EngineError::Vrf(format!("invalid signature: {:?}", e)))?;

        use schnorrkel::context::SigningContext;
        let ctx = SigningContext::new(VRF_SIGNING_CONTEXT);
        if public_key
            .verify(ctx.bytes(expected_input.as_bytes()), &signature)
            .is_err()
        {
            return Ok(false);
        }

        // The output must be derived from the proof.
        let mut hasher = Sha256::new();
        hasher.update(signature_array);
        Ok(hasher.finalize().as_slice() == vrf_output.as_slice())
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.keypair.public.to_bytes())
    }
}
