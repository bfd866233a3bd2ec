fn main() -> anyhow::Result<()> {
    autogen::run()
}
