use std::path::PathBuf;

use tomo_volume::Session;
use tomo_volume::SessionOptions;

/// Headless demo: open a tomogram (or a directory of them) and write the
/// contrast-windowed center slice to disk.
fn main() {
    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .expect("usage: tomo-volume <mrc file or directory>");

    let mut session = Session::open(&path, SessionOptions::default())
        .expect("should have opened the tomogram");
    let stats = session.stats();
    println!(
        "{}: dim {:?}, range [{}, {}], mean {}",
        session.files()[session.active_index()].display(),
        session.active_volume().dim(),
        stats.min,
        stats.max,
        stats.mean
    );

    let image = session
        .render_xy()
        .expect("should have rendered the center slice");
    image.save("slice.png").expect("should have written slice.png");
}
