//! kiln demo — plays the built-in demo project, or bounces it to WAV.
//!
//! Usage:
//!   kiln-demo
//!   kiln-demo --wav output.wav [seconds]

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::{env, fs};

use kiln_model::Project;
use kiln_session::Session;

fn main() {
    let args: Vec<String> = env::args().collect();
    let wav_path = args
        .iter()
        .position(|a| a == "--wav")
        .and_then(|i| args.get(i + 1))
        .cloned();
    let seconds = args
        .iter()
        .position(|a| a == "--wav")
        .and_then(|i| args.get(i + 2))
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(8);

    let project = Project::demo();
    println!("Tempo:  {} BPM, swing {:.0}%", project.tempo, project.swing * 100.0);
    println!("Tracks: {}", project.tracks.len());
    for track in &project.tracks {
        println!("  {:>2}  {:<8} [{}]", track.id.0, track.name, track.archetype.name());
    }
    println!();

    let mut session = Session::new(project);
    match wav_path {
        Some(path) => render_to_wav(&session, &path, seconds),
        None => play_audio(&mut session),
    }
}

fn play_audio(session: &mut Session) {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = stop.clone();
    std::thread::spawn(move || {
        let mut line = String::new();
        let _ = std::io::stdin().read_line(&mut line);
        flag.store(true, Ordering::Relaxed);
    });

    session.play();
    println!("Playing. Press Enter to stop.");
    println!();

    while !stop.load(Ordering::Relaxed) && session.is_playing() {
        if let Some(pos) = session.position() {
            print!("\rStep: {:02} | Loop: {:02} | Beat: {:7.2}", pos.step, pos.loop_count, pos.beat);
            let _ = std::io::stdout().flush();
        }
        std::thread::sleep(std::time::Duration::from_millis(10));
    }

    session.stop();
    println!("\rDone.                                ");
}

fn render_to_wav(session: &Session, path: &str, seconds: u32) {
    let sample_rate: u32 = 44_100;
    println!("Rendering {}s to {} at {} Hz...", seconds, path, sample_rate);

    let wav = session.render_to_wav(sample_rate, seconds);
    println!("Rendered {} bytes", wav.len());

    fs::write(path, &wav).unwrap_or_else(|e| {
        eprintln!("Failed to write {}: {}", path, e);
        std::process::exit(1);
    });

    println!("Done.");
}
