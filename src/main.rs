fn main() -> std::process::ExitCode {
    wepray_lib::run()
}
