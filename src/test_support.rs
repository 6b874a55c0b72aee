//! 測試共用的憑證與 CSR 產生工具，全部在記憶體中以 openssl 即時產生。

use openssl::{
    asn1::Asn1Time,
    bn::BigNum,
    ec::{EcGroup, EcKey},
    hash::MessageDigest,
    nid::Nid,
    pkey::{PKey, Private},
    x509::{X509Builder, X509Name, X509NameBuilder, X509ReqBuilder, X509},
};

pub fn generate_key() -> PKey<Private> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
}

fn name(cn: &str) -> X509Name {
    let mut builder = X509NameBuilder::new().unwrap();
    builder.append_entry_by_nid(Nid::COMMONNAME, cn).unwrap();
    builder.build()
}

fn issue(
    cn: &str,
    serial: u32,
    key: &PKey<Private>,
    issuer: Option<(&X509, &PKey<Private>)>,
    days: u32,
) -> X509 {
    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    let serial = BigNum::from_u32(serial).unwrap().to_asn1_integer().unwrap();
    builder.set_serial_number(&serial).unwrap();
    builder.set_subject_name(&name(cn)).unwrap();
    match issuer {
        Some((issuer_cert, _)) => builder.set_issuer_name(issuer_cert.subject_name()).unwrap(),
        None => builder.set_issuer_name(&name(cn)).unwrap(),
    }
    builder.set_pubkey(key).unwrap();
    builder
        .set_not_before(&Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(days).unwrap())
        .unwrap();
    let signing_key = issuer.map(|(_, k)| k).unwrap_or(key);
    builder.sign(signing_key, MessageDigest::sha256()).unwrap();
    builder.build()
}

fn to_pem(cert: &X509) -> String {
    String::from_utf8(cert.to_pem().unwrap()).unwrap()
}

/// 一條完整的測試憑證鏈：root -> intermediate2 -> intermediate1 -> leaf。
pub struct TestChain {
    pub leaf: String,
    pub intermediate1: String,
    pub intermediate2: String,
    pub root: String,
}

impl TestChain {
    pub fn generate() -> Self {
        let root_key = generate_key();
        let root = issue("Test Root CA", 1, &root_key, None, 3650);

        let int2_key = generate_key();
        let int2 = issue("Test Intermediate 2", 2, &int2_key, Some((&root, &root_key)), 1825);

        let int1_key = generate_key();
        let int1 = issue("Test Intermediate 1", 3, &int1_key, Some((&int2, &int2_key)), 1825);

        let leaf_key = generate_key();
        let leaf = issue("host.domain.com", 4, &leaf_key, Some((&int1, &int1_key)), 90);

        Self {
            leaf: to_pem(&leaf),
            intermediate1: to_pem(&int1),
            intermediate2: to_pem(&int2),
            root: to_pem(&root),
        }
    }
}

/// 產生一個主體 CN 為 `cn` 的 PEM CSR。
pub fn generate_csr(cn: &str) -> String {
    let key = generate_key();
    let mut builder = X509ReqBuilder::new().unwrap();
    builder.set_subject_name(&name(cn)).unwrap();
    builder.set_pubkey(&key).unwrap();
    builder.sign(&key, MessageDigest::sha256()).unwrap();
    String::from_utf8(builder.build().to_pem().unwrap()).unwrap()
}
