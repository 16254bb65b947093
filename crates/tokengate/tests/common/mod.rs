//! Signing helpers for end-to-end scenarios: a fixed RSA key and fresh EC
//! keys, driving the validator through its public API only.

use aws_lc_rs::rand::SystemRandom;
use aws_lc_rs::signature::{ECDSA_P256_SHA256_FIXED_SIGNING, EcdsaKeyPair, KeyPair, RsaKeyPair};
use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use serde_json::Value;

// Same 2048-bit test key as the unit fixtures; PKCS#8 DER.
const RSA_PKCS8_B64: &str = concat!(
	"MIIEvQIBADANBgkqhkiG9w0BAQEFAASCBKcwggSjAgEAAoIBAQCjVs0Tnax5rdag7VKn1jOsYLsPFLX1M/lc7+QMGZbQJ5Vl",
	"VUqC/+3LHv6HE0b//sx4kQx20DU4z7Uk/8IKNLt3IxwUi7dfbpQDkujm2FcBlLRYYOJUsmPcA7Lfkt9uMwMbfdXMUB2T/B1f",
	"aacWzCyIQR97sGFxSMaxomZ41WmM8uTHG3iaAQWb+9ZkBHwh86S6cPLNL1OS/+ryMlzAcuPdpkZQJmc2ZvaRq7TFpykZMuKe",
	"t0okAS6+EQBsR27z9u5/4VhocQxhy8N8GKo3kRwJD8hmLgldDFOytzJq1l3j7kmuytNu/PrXdyMHApemmr4XC8RYPV7F/vDp",
	"/82sG/arAgMBAAECggEACXz+VrhfD4ZwpFKE7aj8wXOxChQ66a6GOsbYqXdHEnpqLEPDG08Aoj7/rBsLkc1cVVifr7syjEVM",
	"kYSl4e/kP+xzMiJXmZyTzo1XKCnDDB12SHgATck7EcnJN0GR5xXhhVRO+hphTXpkvmklwqZDo/qceJPrZShEGoeDiltjUUOn",
	"CVwF+bDcnYnzklMtj8nW4j//U9R6rBP8ZTHRf44f4GesSsh6BfFntfOrLJFY+hPVRjLJG3ueobpg34BFhy5Z+u0wtcbgun7K",
	"AKaJqtCfWdWEuwW+mwmZ2b6vtTUffaXhSRH4EwvsVsyzpl2EKR0/k+FE/Krtiy28SQZ4QzxcuQKBgQDYGdPTgE0I7Lht7ML4",
	"oNnLhBUrtYufpxq3D0vsejTkqY+Oo+4NMgVC2pdAaVRGKPjLo71BKNT9SIbPb1m+/Y31qR+A0pXfH5GhN5+KnCXJcWKKVPTs",
	"rRytArt6zUwKdmxvpt/9s3m0urciGnjsuApjhVbZ8pJQ1IeZhrk0kNuhtwKBgQDBfyVlGlG44At0A2kPpOpUIR4CJQi809hC",
	"iJOL9DqsQV2/gnoQBRewZWtkrUBKVPjWwny86NVON2e4w0pH+NbFgzpeabRGhH7TBhniQaDWkBY9j2i/B75eTx1xjb/OO1Ff",
	"cozROd2OsBR/8cWMF2vLIL8C4N2s5vUOtmgRBfXCrQKBgCdD6h1P/q9Uc95lWrfaYjh8c2xRvGDx+ASzHtSFD/9MX+1HFAYJ",
	"xLL1DO6DNPDamPpHcifYx3qOJxCh5uixIY41gKfjm5/DGK72cGK7JJKJq6H+9dHbUo6NJIuXqe1svx86bxCl/8M6+fOUY8x/",
	"VEPpAnLvhG5zb4AR3q0SdRXZAoGAA7AJpWigABb9AOQDv5GUCbBr4vyTsw2ShIoXzcYEzD2erMSu0NlX/zuflVab8A64g1dH",
	"i04gqpHxvxqxsrdyWGdM2HnJPsLNq/XkzmQTzaMHWXr/MwzRuvhlBkH+Us7cmSYUuvQQXeTLLzkLW8Uif8eK/GIOt3nbV8Fw",
	"MErdyS0CgYEAjwKB0GMHX/7Xgj5OBo1ic1373RBFA4mX5/rX9rKPPlsTa4earKvfb6AYnGqIm8CRIMoRrCLKFxQaWBeqzfHg",
	"AqjF9qFevLjrvOLM3rOtWds4BjL5z7P4HOa1d5CJbpkSzp2yyJrO1PEb5r785k5KNe88DL6zG3Au+DmTkt4h7pk=",
);

pub const RSA_N_B64: &str = concat!(
	"o1bNE52sea3WoO1Sp9YzrGC7DxS19TP5XO_kDBmW0CeVZVVKgv_tyx7-hxNG__7MeJEMdtA1OM-1JP_CCjS7dyMcFIu3X26U",
	"A5Lo5thXAZS0WGDiVLJj3AOy35LfbjMDG33VzFAdk_wdX2mnFswsiEEfe7BhcUjGsaJmeNVpjPLkxxt4mgEFm_vWZAR8IfOk",
	"unDyzS9Tkv_q8jJcwHLj3aZGUCZnNmb2kau0xacpGTLinrdKJAEuvhEAbEdu8_buf-FYaHEMYcvDfBiqN5EcCQ_IZi4JXQxT",
	"srcyatZd4-5JrsrTbvz613cjBwKXppq-FwvEWD1exf7w6f_NrBv2qw",
);

pub fn rsa_jwk(kid: &str) -> Value {
	serde_json::json!({
		"kty": "RSA",
		"use": "sig",
		"kid": kid,
		"alg": "RS256",
		"n": RSA_N_B64,
		"e": "AQAB",
	})
}

pub fn rs256_sign(message: &[u8]) -> Vec<u8> {
	let der = STANDARD.decode(RSA_PKCS8_B64).unwrap();
	let key = RsaKeyPair::from_pkcs8(&der).unwrap();
	let mut signature = vec![0u8; 256];
	key
		.sign(
			&aws_lc_rs::signature::RSA_PKCS1_SHA256,
			&SystemRandom::new(),
			message,
			&mut signature,
		)
		.unwrap();
	signature
}

pub struct EcSigner {
	key_pair: EcdsaKeyPair,
}

impl EcSigner {
	pub fn generate() -> Self {
		Self {
			key_pair: EcdsaKeyPair::generate(&ECDSA_P256_SHA256_FIXED_SIGNING).unwrap(),
		}
	}

	pub fn jwk(&self, kid: &str) -> Value {
		let point = self.key_pair.public_key().as_ref();
		let x = URL_SAFE_NO_PAD.encode(&point[1..33]);
		let y = URL_SAFE_NO_PAD.encode(&point[33..65]);
		serde_json::json!({
			"kty": "EC",
			"use": "sig",
			"kid": kid,
			"alg": "ES256",
			"crv": "P-256",
			"x": x,
			"y": y,
		})
	}

	pub fn sign(&self, message: &[u8]) -> Vec<u8> {
		self
			.key_pair
			.sign(&SystemRandom::new(), message)
			.unwrap()
			.as_ref()
			.to_vec()
	}
}

pub fn init_logging() {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.with_test_writer()
		.try_init();
}

pub fn build_token(header: &Value, payload: &Value, sign: impl FnOnce(&[u8]) -> Vec<u8>) -> String {
	let header_enc = URL_SAFE_NO_PAD.encode(serde_json::to_vec(header).unwrap());
	let payload_enc = URL_SAFE_NO_PAD.encode(serde_json::to_vec(payload).unwrap());
	let signing_input = format!("{header_enc}.{payload_enc}");
	let signature = sign(signing_input.as_bytes());
	format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature))
}
