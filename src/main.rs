#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

fn main() {
    studytrack_focus::desktop::run();
}
