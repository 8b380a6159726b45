fn main() -> anyhow::Result<()> {
    postura_lib::run()
}
