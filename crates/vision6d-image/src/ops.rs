use crate::error::ImageError;
use crate::image::Image;
use crate::mask::Mask;

/// Replace every pixel equal to `from` with `to`.
///
/// Renderers usually clear to white; decoding wants a black background so that the
/// background cannot be confused with a bright vertex colour.
pub fn replace_background<const C: usize>(
    image: &mut Image<u8, C>,
    from: [u8; C],
    to: [u8; C],
) {
    image
        .as_slice_mut()
        .chunks_exact_mut(C)
        .filter(|px| **px == from)
        .for_each(|px| px.copy_from_slice(&to));
}

/// Keep pixels inside `mask` and overwrite the rest with `fill`.
pub fn apply_mask<const C: usize>(
    image: &Image<u8, C>,
    mask: &Mask,
    fill: [u8; C],
) -> Result<Image<u8, C>, ImageError> {
    if image.size() != mask.size() {
        return Err(ImageError::InvalidImageSize(
            image.width(),
            image.height(),
            mask.width(),
            mask.height(),
        ));
    }
    let mut out = image.clone();
    out.as_slice_mut()
        .chunks_exact_mut(C)
        .zip(mask.as_slice().iter())
        .filter(|(_, keep)| !**keep)
        .for_each(|(px, _)| px.copy_from_slice(&fill));
    Ok(out)
}
