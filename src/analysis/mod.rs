pub mod ela;
pub mod phash;
pub mod saliency;
