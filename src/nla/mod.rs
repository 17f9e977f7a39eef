pub mod asn1;
pub mod cssp;
pub mod ntlm;
pub mod rc4;
pub mod sspi;
