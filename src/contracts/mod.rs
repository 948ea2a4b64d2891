// Contracts Module - read-only ABIs used by the name resolver

pub mod pixotchi_nft;

pub use pixotchi_nft::IPixotchiNFT;
