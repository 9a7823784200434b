use num::{Complex, Zero};

use rustfft::{FftDirection, FftNum, FftPlanner};

use ndarray::{Array2, ArrayView2, ArrayViewMut2, Axis};

/// Moves the zero-frequency sample to the centre of each axis.
///
/// Works for odd and even sizes: along an axis of length `n` the output
/// sample `j` is the input sample `(j + n - n/2) % n`.
pub fn fftshift2<T>(in_data: ArrayView2<T>) -> Array2<T>
where
    T: Copy,
{
    let h = in_data.shape()[0];
    let w = in_data.shape()[1];
    Array2::from_shape_fn((h, w), |(i, j)| {
        in_data[((i + h - h / 2) % h, (j + w - w / 2) % w)]
    })
}

fn _fft_lanes<T: FftNum>(mut data: ArrayViewMut2<Complex<T>>, axis: Axis, inverse: bool) {
    let len = data.len_of(axis);
    if len == 0 {
        return;
    }
    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft(
        len,
        if inverse {
            FftDirection::Inverse
        } else {
            FftDirection::Forward
        },
    );
    let mut scratch = vec![Complex::zero(); fft.get_inplace_scratch_len()];
    let mut buf = vec![Complex::zero(); len];
    for mut lane in data.lanes_mut(axis) {
        buf.iter_mut().zip(lane.iter()).for_each(|(b, &x)| *b = x);
        fft.process_with_scratch(&mut buf, &mut scratch);
        lane.iter_mut().zip(buf.iter()).for_each(|(x, &b)| *x = b);
    }
}

/// In-place unnormalized 2D transform, rows first then columns.
pub fn fft2_inplace<T: FftNum>(mut data: ArrayViewMut2<Complex<T>>, inverse: bool) {
    _fft_lanes(data.view_mut(), Axis(1), inverse);
    _fft_lanes(data.view_mut(), Axis(0), inverse);
}

/// Forward 2D DFT of a real map, without normalization.
pub fn fft2(input: ArrayView2<f64>) -> Array2<Complex<f64>> {
    let mut output = input.map(|&x| Complex::new(x, 0.0));
    fft2_inplace(output.view_mut(), false);
    output
}

/// Inverse 2D DFT, scaled by `1/(h*w)` so that `ifft2(fft2(x)) == x`.
pub fn ifft2(input: ArrayView2<Complex<f64>>) -> Array2<Complex<f64>> {
    let mut output = input.to_owned();
    fft2_inplace(output.view_mut(), true);
    let n = output.len().max(1) as f64;
    output.mapv_inplace(|x| x / n);
    output
}

/// Squared magnitude of the centred Fourier transform of `map`.
pub fn power_spectrum_2d(map: ArrayView2<f64>) -> Array2<f64> {
    let spectrum = fft2(map);
    fftshift2(spectrum.view()).map(|x| x.norm_sqr())
}
